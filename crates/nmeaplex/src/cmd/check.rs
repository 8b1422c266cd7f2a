use nmeaplex::InterfaceDecl;

use crate::cmd::CheckArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_check, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let mut checked = Vec::with_capacity(args.interfaces.len());
    for text in args.interfaces {
        let context = format!("invalid interface {text:?}");
        let decl: InterfaceDecl = text
            .parse()
            .map_err(|err| transport_error(&context, err))?;
        let result = decl.check().map_err(|err| transport_error(&context, err))?;
        checked.push((text, result));
    }

    print_check(&checked, format);
    Ok(SUCCESS)
}
