use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nmeaplex::{CheckedInterface, TransportSummary};
use serde::Serialize;

const CHECK_SCHEMA_ID: &str = "nmeaplex/cli/v1/check";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    schema_id: &'a str,
    valid: bool,
    interfaces: Vec<InterfaceOutput>,
}

#[derive(Serialize)]
struct InterfaceOutput {
    declaration: String,
    kind: &'static str,
    name: Option<String>,
    direction: &'static str,
    checksum: bool,
    qsize: Option<usize>,
    target: String,
    scope: Option<&'static str>,
    device: Option<String>,
}

impl InterfaceOutput {
    fn new(declaration: &str, checked: &CheckedInterface) -> Self {
        let (target, scope, device) = match &checked.transport {
            TransportSummary::File { target } => (target.clone(), None, None),
            TransportSummary::Mcast {
                group,
                scope,
                device,
            } => (group.to_string(), Some(scope.as_str()), device.clone()),
        };
        Self {
            declaration: declaration.to_string(),
            kind: checked.kind.as_str(),
            name: checked.name.clone(),
            direction: checked.direction.as_str(),
            checksum: checked.checksum,
            qsize: checked.qsize,
            target,
            scope,
            device,
        }
    }
}

/// Print validated declarations, paired with their source text.
pub fn print_check(checked: &[(String, CheckedInterface)], format: OutputFormat) {
    let interfaces: Vec<_> = checked
        .iter()
        .map(|(decl, c)| InterfaceOutput::new(decl, c))
        .collect();

    match format {
        OutputFormat::Json => {
            let out = CheckOutput {
                schema_id: CHECK_SCHEMA_ID,
                valid: true,
                interfaces,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "KIND", "NAME", "DIRECTION", "TARGET", "SCOPE", "QSIZE", "CHECKSUM",
                ]);
            for i in &interfaces {
                table.add_row(vec![
                    i.kind.to_string(),
                    i.name.clone().unwrap_or_else(|| "-".to_string()),
                    i.direction.to_string(),
                    i.target.clone(),
                    i.scope.unwrap_or("-").to_string(),
                    i.qsize.map_or_else(|| "-".to_string(), |q| q.to_string()),
                    if i.checksum { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for i in &interfaces {
                print!("{} {} target={}", i.kind, i.direction, i.target);
                if let Some(name) = &i.name {
                    print!(" name={name}");
                }
                if let Some(scope) = i.scope {
                    print!(" scope={scope}");
                }
                if let Some(device) = &i.device {
                    print!(" device={device}");
                }
                if let Some(qsize) = i.qsize {
                    print!(" qsize={qsize}");
                }
                println!(" checksum={}", if i.checksum { "yes" } else { "no" });
            }
        }
    }
}
