use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sbpf_vm::abi::{DEFAULT_COMPUTE_BUDGET, DEFAULT_HEAP_SIZE};
use sbpf_vm::{Interpreter, Program, SyscallRegistry, VmOptions};

#[derive(Parser)]
#[command(name = "sbpf-vm")]
#[command(about = "Load, verify, disassemble and run SBF programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a program and run the static verifier over it.
    Verify {
        #[arg(help = "Input ELF shared object")]
        program: PathBuf,
    },
    /// Print one line per instruction.
    Disasm {
        #[arg(help = "Input ELF shared object, or raw bytecode with --raw")]
        program: PathBuf,

        #[arg(long, help = "Treat the input as bare .text bytes")]
        raw: bool,
    },
    /// Execute a program once with the builtin syscalls.
    Run {
        #[arg(help = "Input ELF shared object, or raw bytecode with --raw")]
        program: PathBuf,

        #[arg(long, help = "Treat the input as bare .text bytes")]
        raw: bool,

        #[arg(short, long, help = "File whose bytes are mapped as the input region")]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_COMPUTE_BUDGET, help = "Compute unit budget")]
        max_cu: u64,

        #[arg(long, default_value_t = DEFAULT_HEAP_SIZE, help = "Heap size in bytes")]
        heap_size: usize,

        #[arg(long, help = "Print the outcome as JSON")]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify { program } => {
            let loaded = read_program(&program, false)?;
            loaded
                .verify()
                .with_context(|| format!("{} failed verification", program.display()))?;
            println!(
                "{}: ok ({} instructions, {} functions)",
                program.display(),
                loaded.slot_count(),
                loaded.functions().len()
            );
        }
        Commands::Disasm { program, raw } => {
            let loaded = read_program(&program, raw)?;
            print!("{}", sbpf_vm::sbf::listing(loaded.text()));
        }
        Commands::Run {
            program,
            raw,
            input,
            max_cu,
            heap_size,
            json,
        } => {
            let loaded = read_program(&program, raw)?;
            let input = match input {
                Some(path) => fs::read(&path)
                    .with_context(|| format!("Failed to read input {}", path.display()))?,
                None => Vec::new(),
            };
            let options = VmOptions::default()
                .with_compute_budget(max_cu)
                .with_heap_size(heap_size)
                .with_input(input);
            return run(&loaded, options, json);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_program(path: &Path, raw: bool) -> Result<Program> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let program = if raw {
        Program::from_text_bytes(&bytes)
    } else {
        sbpf_vm::load(&bytes)
    };
    let program = program.with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::debug!(path = %path.display(), raw, slots = program.slot_count(), "read program");
    Ok(program)
}

fn run(program: &Program, options: VmOptions, json: bool) -> Result<ExitCode> {
    let syscalls = SyscallRegistry::with_builtins();
    let mut vm = Interpreter::new(program, &syscalls, options).context("Verification failed")?;
    let result = vm.run();
    let compute_used = vm.compute_used();
    let compute_remaining = vm.compute_remaining();
    let (_, logs) = vm.into_output();

    if json {
        let (value, fault) = match &result {
            Ok(value) => (Some(*value), None),
            Err(exception) => (None, Some(exception.to_string())),
        };
        let report = serde_json::json!({
            "logs": logs,
            "return_value": value,
            "compute_used": compute_used,
            "compute_remaining": compute_remaining,
            "fault": fault,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in &logs {
            println!("{line}");
        }
        match &result {
            Ok(value) => println!("Program returned {value} ({value:#x})"),
            Err(exception) => eprintln!("Program failed: {exception}"),
        }
        println!("Consumed {compute_used} compute units, {compute_remaining} remaining");
    }

    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
