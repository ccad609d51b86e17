use anyhow::Result;
use clap::{Parser, Subcommand};

use dwarfdb::{FileLineInfoKind, FunctionNameKind, LineInfoSpecifier, VerifyTarget};

#[derive(Debug, Parser)]
struct DwarfCk {
    filename: std::path::PathBuf,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Checks the debug info for structural problems.
    Verify {
        /// Only check .debug_info.
        #[clap(long)]
        info: bool,
        /// Only check .debug_line.
        #[clap(long)]
        line: bool,
        /// Only check .apple_names.
        #[clap(long)]
        apple_names: bool,
    },
    /// Prints the source location of an address.
    Lookup {
        #[clap(value_parser = parse_int::parse::<u64>)]
        address: u64,
        /// Print the whole inlining stack.
        #[clap(long)]
        inlines: bool,
        /// Print file names as they appear in the line table.
        #[clap(long)]
        relative: bool,
        /// Print short function names instead of linkage names.
        #[clap(long)]
        short: bool,
    },
}

fn main() -> Result<()> {
    let args = DwarfCk::parse();

    let ctx = dwarfdb::parse_file(&args.filename)?;

    match args.cmd {
        Cmd::Verify {
            info,
            line,
            apple_names,
        } => {
            let target = if info || line || apple_names {
                VerifyTarget {
                    info,
                    line,
                    apple_names,
                }
            } else {
                VerifyTarget::ALL
            };
            let red = ansi_term::Colour::Red.bold();
            let dim = ansi_term::Style::new().dimmed();
            let mut count = 0;
            let ok = ctx.verify(target, |d| {
                count += 1;
                println!(
                    "{} {} {}",
                    red.paint("error:"),
                    dim.paint(format!("{}[{:#010x}]", d.section.name(), d.offset)),
                    d.message
                );
            });
            if ok {
                println!("{}", ansi_term::Colour::Green.paint("No errors."));
            } else {
                println!("{}", red.paint(format!("{} errors.", count)));
                std::process::exit(1);
            }
        }
        Cmd::Lookup {
            address,
            inlines,
            relative,
            short,
        } => {
            let spec = LineInfoSpecifier {
                file: if relative {
                    FileLineInfoKind::RawValue
                } else {
                    FileLineInfoKind::AbsoluteFilePath
                },
                function: if short {
                    FunctionNameKind::ShortName
                } else {
                    FunctionNameKind::LinkageName
                },
            };
            let frames = if inlines {
                ctx.inlining_info_for_address(address, spec).frames().to_vec()
            } else {
                vec![ctx.line_info_for_address(address, spec)]
            };
            if frames.iter().all(|f| *f == Default::default()) {
                println!(
                    "{}",
                    ansi_term::Colour::Yellow.paint(format!("no line info for {:#x}", address))
                );
                return Ok(());
            }

            let bold = ansi_term::Style::new().bold();
            for frame in &frames {
                println!(
                    "{}",
                    bold.paint(frame.function_name.as_deref().unwrap_or("??"))
                );
                println!(
                    "  {}:{}:{}",
                    frame.file_name.as_deref().unwrap_or("??"),
                    frame.line,
                    frame.column
                );
            }
        }
    }

    Ok(())
}
