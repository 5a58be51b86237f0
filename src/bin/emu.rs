use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use clap_num::{maybe_hex, number_range};

use chip8_vm::{
    debugger::{Cli, Command, CommandResult, Executor},
    emu::{
        Chip8Result, DEFAULT_CPU_HZ, DISPLAY_X, Emulator, EmulatorConfig, Framebuffer, Ports,
        Snapshot,
    },
};

/// Headless CHIP-8 emulator driven from a command prompt.
///
/// Type `help` at the prompt for the list of commands. An empty line repeats
/// the previous command.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_CPU_HZ, value_parser = cpu_hz_in_range)]
    cpu_hz: u32,

    /// Print every executed instruction and lifecycle event to stderr
    #[arg(long)]
    trace: bool,

    /// Disable the terminal bell while the sound timer runs
    #[arg(long)]
    mute: bool,

    /// Seed for the random number instruction
    #[arg(long, value_parser = maybe_hex::<u64>)]
    seed: Option<u64>,

    /// Print the screen to stderr on every redraw
    #[arg(long)]
    watch: bool,
}

fn cpu_hz_in_range(s: &str) -> Result<u32, String> {
    number_range(s, 1, 100_000)
}

fn render_screen(display: &Framebuffer) -> String {
    display
        .chunks_exact(DISPLAY_X)
        .map(|row| row.iter().map(|&on| if on { '█' } else { ' ' }).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_registers(snapshot: &Snapshot) -> String {
    let chip8 = &snapshot.chip8;
    let mut output = format!(
        "{}\nPC: {:03X}  I: {:03X}\nDT: {:02X}   ST: {:02X}\n",
        if snapshot.running { "RUNNING" } else { "PAUSED" },
        chip8.pc(),
        chip8.i(),
        chip8.delay_timer(),
        chip8.sound_timer()
    );

    let v = chip8.v();
    for idx in 0..8 {
        output.push_str(&format!(
            "V{:X}: {:02X}   V{:X}: {:02X}\n",
            idx,
            v[idx],
            idx + 8,
            v[idx + 8]
        ));
    }

    let stack: Vec<String> = chip8.stack().iter().map(|addr| format!("{addr:03X}")).collect();
    output.push_str(&format!("Stack: [{}]", stack.join(", ")));

    if let Some(fault) = &snapshot.fault {
        output.push_str(&format!("\nHalted: {fault}"));
    }
    output
}

fn render_result(result: CommandResult) -> Option<String> {
    let output = match result {
        CommandResult::Ok => "OK".to_string(),
        CommandResult::Quit => return None,
        CommandResult::Stepped(Chip8Result::UnknownOpcode(raw)) => {
            format!("Skipped unknown instruction {raw:#06X}")
        }
        CommandResult::Stepped(Chip8Result::WaitingForKey) => "Waiting for key".to_string(),
        CommandResult::Stepped(_) => "OK".to_string(),
        CommandResult::Registers(snapshot) => render_registers(&snapshot),
        CommandResult::Screen(display) => render_screen(&display),
        CommandResult::MemDump { data, offset } => {
            let mut output = String::new();

            for (i, byte) in data.iter().enumerate() {
                if i % 16 == 0 {
                    if i > 0 {
                        output.push('\n');
                    }
                    output.push_str(&format!("{:03X}: ", offset + i as u16));
                }
                output.push_str(&format!("{:02X} ", byte));
            }

            output
        }
        CommandResult::Disasm { instructions } => instructions
            .iter()
            .map(|(addr, opcode)| format!("{addr:03X}: {opcode}"))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Some(output)
}

fn ports(args: &Args) -> Ports {
    let mut ports = Ports::default().with_trace(|line: &str| eprintln!("{line}"));

    if args.watch {
        ports = ports.with_framebuffer(|display: &Framebuffer| {
            eprintln!("{}\n{}", render_screen(display), "-".repeat(DISPLAY_X));
        });
    }

    if !args.mute {
        ports = ports.with_sound(|| eprint!("\x07"));
    }

    ports
}

fn repl(executor: &mut Executor) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last_command: Option<Command> = None;

    loop {
        print!("> ");
        stdout.flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        if stdin
            .lock()
            .read_line(&mut input)
            .context("Failed to read command")?
            == 0
        {
            return Ok(());
        }

        let command = if input.trim().is_empty() {
            match &last_command {
                Some(command) => command.clone(),
                None => continue,
            }
        } else {
            match Cli::try_parse_from(input.split_whitespace()) {
                Ok(cli) => cli.command,
                Err(e) => {
                    println!("{e}");
                    last_command = None;
                    continue;
                }
            }
        };

        last_command = Some(command.clone());
        match executor.execute(command) {
            Ok(result) => match render_result(result) {
                Some(output) => println!("{output}"),
                None => return Ok(()),
            },
            Err(e) => println!("{e}"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let config = EmulatorConfig {
        cpu_hz: args.cpu_hz,
        trace: args.trace,
        sound: !args.mute,
        seed: args.seed,
        ..Default::default()
    };

    let emulator = Emulator::spawn(config, ports(&args)).context("Failed to start emulator")?;
    emulator
        .load_rom(rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let mut executor = Executor::new(emulator);
    repl(&mut executor)
}
