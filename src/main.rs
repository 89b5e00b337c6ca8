use std::fs;
use std::io::{stdin, IsTerminal, Write as _};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use console::{Key, Term};
use glob::glob;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, miette, IntoDiagnostic, Result};

use maris::{assemble, Assembly, DisplayMode, Program, RunEnvironment, RunState};

/// Maris is a complete & convenient assembler toolchain for the MARIE assembly language.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.mas` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.mas` or binary `.mex` file directly and output to terminal
    Run {
        /// `.mas` or `.mex` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Pause after every instruction and wait for a key (q stops the run)
        #[arg(short, long)]
        step: bool,
        /// How INPUT values typed at the terminal are read
        #[arg(long, default_value = "hex")]
        input: DisplayMode,
        /// How OUTPUT values are rendered
        #[arg(long, default_value = "hex")]
        output: DisplayMode,
        /// Do not append a linefeed after each OUTPUT value
        #[arg(long)]
        no_linefeed: bool,
    },
    /// Assemble a `.mas` file into `.mex`, `.lst` and `.map` artifacts
    Asm {
        /// `.mas` file to assemble
        name: PathBuf,
        /// Base path for the emitted artifacts
        dest: Option<PathBuf>,
    },
    /// Check a `.mas` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Remove assembler artifacts for a source file or directory
    Clean {
        /// `.mas` file or directory to clean up after
        path: Option<PathBuf>,
    },
    /// Place a watch on a `.mas` file to receive constant assembler updates
    Watch {
        /// `.mas` file to watch
        name: PathBuf,
    },
}

#[derive(Clone, Copy)]
struct RunOptions {
    minimal: bool,
    step: bool,
    input: DisplayMode,
    output: DisplayMode,
    no_linefeed: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            minimal: false,
            step: false,
            input: DisplayMode::Hex,
            output: DisplayMode::Hex,
            no_linefeed: false,
        }
    }
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(maris::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                minimal,
                step,
                input,
                output,
                no_linefeed,
            } => run(
                &name,
                RunOptions {
                    minimal,
                    step,
                    input,
                    output,
                    no_linefeed,
                },
            ),
            Command::Asm { name, dest } => {
                file_message(Green, "Assembling", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let assembly = assemble(&src);

                let stem = dest.unwrap_or_else(|| name.clone());
                let lst = stem.with_extension("lst");
                fs::write(&lst, maris::listing(&assembly, &display_name(&name)))
                    .into_diagnostic()?;
                file_message(Green, "Listed", &lst);

                match assembly.program() {
                    Some(program) => {
                        let mex = stem.with_extension("mex");
                        fs::write(&mex, program.encode()).into_diagnostic()?;
                        let map = stem.with_extension("map");
                        fs::write(&map, maris::symbol_map(&assembly)).into_diagnostic()?;
                        message(Green, "Finished", "emit binary");
                        file_message(Green, "Saved", &mex);
                        Ok(())
                    }
                    None => {
                        print_reports(&assembly, &src);
                        bail!(
                            "{} error(s) found, assembly unsuccessful",
                            assembly.error_count
                        )
                    }
                }
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let assembly = assemble(&src);
                if assembly.is_clean() {
                    message(Green, "Success", "no errors found!");
                    Ok(())
                } else {
                    print_reports(&assembly, &src);
                    bail!(
                        "{} error(s) found, assembly unsuccessful",
                        assembly.error_count
                    )
                }
            }
            Command::Clean { path } => clean(&path.unwrap_or_else(|| PathBuf::from("."))),
            Command::Watch { name } => watch(&name),
        }
    } else if let Some(path) = args.path {
        run(&path, RunOptions::default())
    } else {
        println!("\n~ maris v{VERSION} ~");
        println!("{}", LOGO.truecolor(125, 190, 255).bold());
        println!("{SHORT_INFO}");
        Ok(())
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into())
}

fn print_reports(assembly: &Assembly, src: &str) {
    for report in assembly.reports(src) {
        eprintln!("{report:?}");
    }
}

/// Assemble or decode the file, load it, and drive the machine to a halt.
fn run(name: &Path, opts: RunOptions) -> Result<()> {
    let Some(ext) = name.extension() else {
        bail!("File has no extension. Exiting...");
    };
    let program = match ext.to_str() {
        Some("mex") => {
            let bytes = fs::read(name).into_diagnostic()?;
            Program::decode(&bytes).into_diagnostic()?
        }
        Some("mas") => {
            if !opts.minimal {
                file_message(MsgColor::Green, "Assembling", name);
            }
            let src = fs::read_to_string(name).into_diagnostic()?;
            let assembly = assemble(&src);
            match assembly.program() {
                Some(program) => program,
                None => {
                    print_reports(&assembly, &src);
                    bail!(
                        "{} error(s) found, assembly unsuccessful",
                        assembly.error_count
                    )
                }
            }
        }
        _ => bail!("File has unknown extension. Exiting..."),
    };

    if program.is_empty() {
        bail!("program has no statements to run");
    }
    let mut env = RunEnvironment::new(&program).map_err(|e| miette!("{e}"))?;
    env.set_stepping(opts.step);
    if !opts.minimal {
        message(MsgColor::Green, "Running", "loaded program");
    }

    let mut echoed = 0;
    loop {
        let state = env.step();

        // Echo anything the program emitted since the last step
        for word in &env.output()[echoed..] {
            let rendered = opts.output.render_word(*word);
            if opts.no_linefeed {
                print!("{rendered}");
                let _ = std::io::stdout().flush();
            } else {
                println!("{rendered}");
            }
        }
        echoed = env.output().len();

        match state {
            RunState::Running => continue,
            RunState::BlockedOnInput => {
                let text = read_input_line(opts.minimal)?;
                if env.supply_input_text(&text, opts.input).is_err() {
                    let err = env.machine().fatal().map_or_else(
                        || "input rejected".to_string(),
                        |kind| kind.to_string(),
                    );
                    bail!("machine halted abnormally: {err}");
                }
            }
            RunState::Paused => {
                maris::print_registers(env.machine(), opts.minimal);
                if !next_step_key() {
                    env.request_stop();
                }
            }
            RunState::HaltedNormal => {
                if !opts.minimal {
                    message(MsgColor::Green, "Halted", "machine halted normally");
                    file_message(MsgColor::Green, "Completed", name);
                }
                return Ok(());
            }
            RunState::HaltedByUser => {
                if !opts.minimal {
                    message(MsgColor::Cyan, "Halted", "halted at user request");
                }
                return Ok(());
            }
            RunState::HaltedAbnormal => {
                if !opts.minimal {
                    maris::print_registers(env.machine(), false);
                }
                let err = env
                    .machine()
                    .fatal()
                    .map_or_else(|| "unknown error".to_string(), |kind| kind.to_string());
                bail!("machine halted abnormally: {err}");
            }
            RunState::Uninitialized | RunState::NoProgramLoaded => {
                bail!("no program loaded")
            }
        }
    }
}

/// One line of text for the INPUT register, from the terminal or piped stdin.
fn read_input_line(minimal: bool) -> Result<String> {
    if stdin().is_terminal() {
        if !minimal {
            message(MsgColor::Cyan, "Input", "waiting for value");
        }
        Term::stdout().read_line().into_diagnostic()
    } else {
        let mut buf = String::new();
        let read = stdin().read_line(&mut buf).into_diagnostic()?;
        if read == 0 {
            bail!("input stream ended while the machine was blocked on input");
        }
        Ok(buf)
    }
}

/// Wait for the next key in step mode. Returns false if the user asked to
/// stop. A non-interactive stdin just keeps stepping.
fn next_step_key() -> bool {
    if !stdin().is_terminal() {
        return true;
    }
    !matches!(
        Term::stdout().read_key(),
        Ok(Key::Char('q')) | Ok(Key::Escape)
    )
}

/// Remove generated artifacts: the three derived files next to a source, or
/// everything matching them inside a directory.
fn clean(path: &Path) -> Result<()> {
    let mut removed = 0;
    if path.is_dir() {
        for pattern in ["*.mex", "*.lst", "*.map"] {
            let pattern = path.join(pattern);
            let entries = glob(&pattern.to_string_lossy()).into_diagnostic()?;
            for entry in entries {
                let file = entry.into_diagnostic()?;
                fs::remove_file(&file).into_diagnostic()?;
                file_message(MsgColor::Green, "Removed", &file);
                removed += 1;
            }
        }
    } else {
        for ext in ["mex", "lst", "map"] {
            let artifact = path.with_extension(ext);
            if artifact.exists() {
                fs::remove_file(&artifact).into_diagnostic()?;
                file_message(MsgColor::Green, "Removed", &artifact);
                removed += 1;
            }
        }
    }
    if removed == 0 {
        message(MsgColor::Cyan, "Clean", "no artifacts to remove");
    }
    Ok(())
}

/// Re-check the watched file every time it changes on disk.
fn watch(name: &Path) -> Result<()> {
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Vim breaks if watching a single file
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let name = name.to_path_buf();

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(MsgColor::Green, "Watching", &name);
    message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

    let mut watcher =
        Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            // Watch remove for vim changes
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(MsgColor::Green, "Watching", &name);
                message(MsgColor::Green, "Re-checking", "file change detected");
                message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

                // Editors fire several events per save; a beat makes reruns obvious
                sleep(Duration::from_millis(50));

                let src = match fs::read_to_string(&name) {
                    Ok(src) => src,
                    Err(e) => {
                        eprintln!("{e}. Exiting...");
                        std::process::exit(1)
                    }
                };
                let assembly = assemble(&src);
                if assembly.is_clean() {
                    message(MsgColor::Green, "Success", "no errors found!");
                } else {
                    print_reports(&assembly, &src);
                    message(
                        MsgColor::Red,
                        "Failure",
                        &format!("{} error(s) found", assembly.error_count),
                    );
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

const LOGO: &str = r#"
  ________ _____  ______ (_)_____
 /  ' _  `/ __ `/ ___/ / / ___/
/ /  / / / /_/ / /  / / (__  )
\_/ /_/ /_/\__,_/_/  /_/____/"#;

const SHORT_INFO: &str = r"
Welcome to maris (MARIE Assembler & Runtime Interpreter System),
an all-in-one toolchain for working with MARIE assembly code.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
