use nmeaplex::InterfaceDecl;
use nmeaplex_core::{ExitReason, InterfaceExit, InterfaceId, Mux};
use tracing::{info, warn};

use crate::cmd::RunArgs;
use crate::exit::{
    interface_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, INTERRUPTED, SUCCESS,
};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let mut decls = Vec::with_capacity(args.interfaces.len());
    for text in &args.interfaces {
        let decl: InterfaceDecl = text
            .parse()
            .map_err(|err| transport_error(&format!("invalid interface {text:?}"), err))?;
        decls.push(decl);
    }

    let mut mux = Mux::new(args.qsize);
    for (n, decl) in decls.iter().enumerate() {
        let id = InterfaceId::new(n as u32 + 1);
        let built = decl
            .open(id)
            .map_err(|err| transport_error(&format!("failed to open {}", decl.display_name(id)), err))?;
        mux.add(built);
    }

    install_ctrlc_handler()?;

    let running = mux.start().map_err(|err| interface_error("failed to start", err))?;
    let exits = running.wait();
    Ok(summarize(&exits))
}

fn summarize(exits: &[InterfaceExit]) -> i32 {
    let mut code = SUCCESS;
    for exit in exits {
        match &exit.reason {
            ExitReason::EndOfStream | ExitReason::QueueClosed => {}
            ExitReason::Failed(err) => {
                warn!(interface = %exit.id, name = %exit.name, error = %err, "interface failed");
                code = FAILURE;
            }
            ExitReason::Unrunnable(why) => {
                warn!(interface = %exit.id, name = %exit.name, reason = *why, "interface could not run");
                code = FAILURE;
            }
            ExitReason::Panicked => code = FAILURE,
        }
    }
    let sentences: u64 = exits.iter().map(|e| e.sentences).sum();
    let dropped: u64 = exits.iter().map(|e| e.dropped).sum();
    info!(interfaces = exits.len(), sentences, dropped, "all interfaces finished");
    code
}

// Readers block in I/O with no way to interrupt them, so exit directly.
fn install_ctrlc_handler() -> CliResult<()> {
    ctrlc::set_handler(|| {
        info!("interrupted, exiting");
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
