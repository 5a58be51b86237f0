use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use super::{
    Chip8, Chip8Error, Chip8Result, ConfigError, EmulatorConfig, Ports, format_line,
    instruction_message,
};
use crate::u4;

/// A fixed-rate deadline.
///
/// A cadence that falls more than one period behind fires once and re-anchors
/// to `now + period`; the missed ticks are dropped rather than replayed.
#[derive(Clone, Copy, Debug)]
pub struct Cadence {
    period: Duration,
    next: Instant,
}

impl Cadence {
    /// The first tick is due immediately.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, next: now }
    }

    pub fn restart(&mut self, now: Instant) {
        self.next = now;
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Returns true (and schedules the following tick) if a tick is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }

        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
        true
    }
}

/// Everything the worker owns: the machine state plus the ports it reports to.
///
/// Every mutation goes through `&mut self`, so CPU and timer ticks never interleave.
pub struct Machine {
    chip8: Chip8,
    ports: Ports,
    trace: bool,
    sound: bool,
    fault: Option<Chip8Error>,
}

impl Machine {
    pub fn new(config: &EmulatorConfig, ports: Ports) -> Self {
        let chip8 = match config.seed {
            Some(seed) => Chip8::with_seed(seed),
            None => Chip8::new(),
        };

        let mut machine = Self {
            chip8,
            ports,
            trace: config.trace,
            sound: config.sound,
            fault: None,
        };

        machine.log("Emulator started");
        machine.log("16 fonts loaded in to memory");
        machine.present();
        machine
    }

    /// Runs one fetch-decode-execute cycle and notifies the ports.
    ///
    /// A fault is latched and returned; the caller must stop ticking.
    pub fn cpu_tick(&mut self) -> Result<Chip8Result, Chip8Error> {
        let pc = self.chip8.pc();

        if log::log_enabled!(log::Level::Trace)
            && let Ok(opcode) = self.chip8.peek_opcode()
        {
            log::trace!("{}", instruction_message(pc, &opcode));
        }

        if self.trace {
            match self.chip8.peek_opcode() {
                Ok(opcode) => self.trace_line(&instruction_message(pc, &opcode)),
                Err(e) => self.trace_line(&format!("{pc:#05X} -> {e}")),
            }
        }

        let result = self.chip8.cpu_cycle();
        match &result {
            Ok(Chip8Result::Redraw) => self.present(),
            Ok(Chip8Result::UnknownOpcode(raw)) => {
                log::warn!("Unknown instruction {raw:#06X} at {pc:#05X}");
            }
            Ok(Chip8Result::Continue | Chip8Result::WaitingForKey) => {}
            Err(e) => {
                log::error!("Emulation halted at {pc:#05X}: {e}");
                self.trace_line(&format!("Emulation halted: {e}"));
                self.fault = Some(e.clone());
            }
        }

        result
    }

    /// Runs one 60Hz tick, firing the sound trigger while the sound timer is active.
    pub fn timer_tick(&mut self) {
        if self.chip8.timers_cycle() && self.sound {
            self.ports.sound.beep();
        }
    }

    /// Full reset followed by copying the ROM to the program region.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if let Err(e) = self.chip8.load(rom) {
            log::error!("Failed to load ROM: {e}");
            return Err(e);
        }

        self.fault = None;
        self.log("Emulator restarted");
        self.log("16 fonts loaded in to memory");
        self.present();
        log::info!("Loaded {} byte ROM", rom.len());
        self.log("Starting game");
        Ok(())
    }

    pub fn set_key(&mut self, key: u4) {
        self.chip8.set_key(key);
        log::debug!("key press {key}");
        self.trace_line(&format!("key press {}", key.get()));
    }

    pub fn clear_key(&mut self, key: u4) {
        self.chip8.clear_key(key);
        log::debug!("key released {key}");
        self.trace_line(&format!("key released {}", key.get()));
    }

    pub fn chip8(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }

    pub fn fault(&self) -> Option<&Chip8Error> {
        self.fault.as_ref()
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Lifecycle message: always logged, traced when tracing is on.
    pub fn log(&mut self, message: &str) {
        log::info!("{message}");
        self.trace_line(message);
    }

    fn trace_line(&mut self, message: &str) {
        if self.trace {
            self.ports
                .trace
                .trace(&format_line(SystemTime::now(), message));
        }
    }

    fn present(&mut self) {
        self.ports.framebuffer.present(self.chip8.display());
    }
}

/// A copy of the machine state as seen between two ticks.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub chip8: Chip8,
    pub running: bool,
    pub fault: Option<Chip8Error>,
}

/// Why an emulator worker could not be started.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to spawn emulator worker: {0}")]
    Thread(#[from] std::io::Error),
}

/// Target of a debugger `set`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    V(u4),
    I,
    Pc,
    DelayTimer,
    SoundTimer,
}

type Reply<T> = Sender<T>;

enum Message {
    LoadRom(Vec<u8>, Reply<Result<(), Chip8Error>>),
    Stop(Reply<()>),
    Resume(Reply<()>),
    Step(Reply<Result<Chip8Result, Chip8Error>>),
    SetKey(u4),
    ClearKey(u4),
    Poke(Register, u16, Reply<()>),
    Snapshot(Reply<Snapshot>),
    Shutdown,
}

/// Owns the machine on the worker thread and serializes ticks with control messages.
struct Worker {
    machine: Machine,
    inbox: Receiver<Message>,
    cpu: Cadence,
    timers: Cadence,
    running: bool,
}

impl Worker {
    fn run(mut self) {
        loop {
            let message = if self.running {
                let deadline = self.cpu.deadline().min(self.timers.deadline());
                let timeout = deadline.saturating_duration_since(Instant::now());
                match self.inbox.recv_timeout(timeout) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.inbox.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                }
            };

            match message {
                Some(Message::Shutdown) => break,
                Some(message) => self.handle(message),
                None => {}
            }

            // Ticks still fire while the inbox is busy
            if self.running {
                self.run_due(Instant::now());
            }
        }

        log::info!("Emulator shut down");
    }

    fn run_due(&mut self, now: Instant) {
        if self.timers.poll(now) {
            self.machine.timer_tick();
        }

        if self.cpu.poll(now) && self.machine.cpu_tick().is_err() {
            self.running = false;
        }
    }

    fn start(&mut self) {
        let now = Instant::now();
        self.cpu.restart(now);
        self.timers.restart(now);
        self.running = true;
    }

    // A dropped reply receiver only means the caller stopped waiting
    fn handle(&mut self, message: Message) {
        match message {
            Message::LoadRom(rom, reply) => {
                self.running = false;
                let result = self.machine.load_rom(&rom);
                if result.is_ok() {
                    self.start();
                }
                let _ = reply.send(result);
            }
            Message::Stop(reply) => {
                if self.running {
                    self.running = false;
                    self.machine.log("Emulation paused!");
                }
                let _ = reply.send(());
            }
            Message::Resume(reply) => {
                if !self.running {
                    self.machine.clear_fault();
                    self.start();
                    self.machine.log("Emulation resumed!");
                }
                let _ = reply.send(());
            }
            Message::Step(reply) => {
                let result = self.machine.cpu_tick();
                if result.is_err() {
                    self.running = false;
                }
                let _ = reply.send(result);
            }
            Message::SetKey(key) => self.machine.set_key(key),
            Message::ClearKey(key) => self.machine.clear_key(key),
            Message::Poke(register, value, reply) => {
                let chip8 = self.machine.chip8_mut();
                match register {
                    Register::V(reg) => chip8.set_register(reg, value as u8),
                    Register::I => chip8.set_index(value),
                    Register::Pc => chip8.set_pc(value),
                    Register::DelayTimer => chip8.set_delay_timer(value as u8),
                    Register::SoundTimer => chip8.set_sound_timer(value as u8),
                }
                let _ = reply.send(());
            }
            Message::Snapshot(reply) => {
                let _ = reply.send(Snapshot {
                    chip8: self.machine.chip8().clone(),
                    running: self.running,
                    fault: self.machine.fault().cloned(),
                });
            }
            Message::Shutdown => {}
        }
    }
}

/// Handle to an emulator running on its own worker thread.
///
/// The worker starts paused. Both periodic activities start on `load_rom` or
/// `resume` and stop together on `stop`, on a fault, or when the handle is dropped.
pub struct Emulator {
    inbox: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl Emulator {
    pub fn spawn(config: EmulatorConfig, ports: Ports) -> Result<Self, SpawnError> {
        config.validate()?;

        let (inbox, rx) = mpsc::channel();
        let now = Instant::now();
        let worker = Worker {
            machine: Machine::new(&config, ports),
            inbox: rx,
            cpu: Cadence::new(config.cpu_period(), now),
            timers: Cadence::new(config.timer_period(), now),
            running: false,
        };

        let worker = thread::Builder::new()
            .name("chip8-worker".into())
            .spawn(move || worker.run())
            .inspect_err(|e| log::error!("Failed to spawn emulator worker: {e}"))?;

        Ok(Self {
            inbox,
            worker: Some(worker),
        })
    }

    /// Halts both activities, resets the machine, loads `rom` and starts both again.
    pub fn load_rom(&self, rom: impl Into<Vec<u8>>) -> Result<(), Chip8Error> {
        self.request(|reply| Message::LoadRom(rom.into(), reply))?
    }

    /// Returns once neither activity will run again until `resume`.
    pub fn stop(&self) -> Result<(), Chip8Error> {
        self.request(Message::Stop)
    }

    /// Restarts both activities from the current state, clearing a latched fault.
    pub fn resume(&self) -> Result<(), Chip8Error> {
        self.request(Message::Resume)
    }

    /// Runs a single CPU cycle, whether or not the emulator is running.
    pub fn step(&self) -> Result<Chip8Result, Chip8Error> {
        self.request(Message::Step)?
    }

    pub fn set_key(&self, key: u4) -> Result<(), Chip8Error> {
        self.send(Message::SetKey(key))
    }

    pub fn clear_key(&self, key: u4) -> Result<(), Chip8Error> {
        self.send(Message::ClearKey(key))
    }

    pub fn poke(&self, register: Register, value: u16) -> Result<(), Chip8Error> {
        self.request(|reply| Message::Poke(register, value, reply))
    }

    pub fn snapshot(&self) -> Result<Snapshot, Chip8Error> {
        self.request(Message::Snapshot)
    }

    fn send(&self, message: Message) -> Result<(), Chip8Error> {
        self.inbox
            .send(message)
            .map_err(|_| Chip8Error::Disconnected)
    }

    fn request<T>(&self, message: impl FnOnce(Reply<T>) -> Message) -> Result<T, Chip8Error> {
        let (reply, answer) = mpsc::channel();
        self.send(message(reply))?;
        answer.recv().map_err(|_| Chip8Error::Disconnected)
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        let _ = self.inbox.send(Message::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("Emulator worker panicked");
        }
    }
}
