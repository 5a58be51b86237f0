//! Output ports the embedding application plugs into the emulator.
//!
//! All calls are synchronous, made from the emulator's worker thread, and their
//! results are never consumed by the core.

use super::Framebuffer;

/// Receives the whole framebuffer each time a clear or draw changed it.
pub trait FramebufferSink: Send {
    fn present(&mut self, frame: &Framebuffer);
}

/// Receives timestamped, human-readable trace lines.
pub trait TraceSink: Send {
    fn trace(&mut self, line: &str);
}

/// Invoked once per timer tick while the sound timer is running.
pub trait SoundTrigger: Send {
    fn beep(&mut self);
}

impl<F: FnMut(&Framebuffer) + Send> FramebufferSink for F {
    fn present(&mut self, frame: &Framebuffer) {
        self(frame)
    }
}

impl<F: FnMut(&str) + Send> TraceSink for F {
    fn trace(&mut self, line: &str) {
        self(line)
    }
}

impl<F: FnMut() + Send> SoundTrigger for F {
    fn beep(&mut self) {
        self()
    }
}

/// The set of ports handed to an emulator. Unset ports discard their input.
pub struct Ports {
    pub framebuffer: Box<dyn FramebufferSink>,
    pub trace: Box<dyn TraceSink>,
    pub sound: Box<dyn SoundTrigger>,
}

impl Ports {
    pub fn with_framebuffer(mut self, sink: impl FramebufferSink + 'static) -> Self {
        self.framebuffer = Box::new(sink);
        self
    }

    pub fn with_trace(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace = Box::new(sink);
        self
    }

    pub fn with_sound(mut self, trigger: impl SoundTrigger + 'static) -> Self {
        self.sound = Box::new(trigger);
        self
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            framebuffer: Box::new(|_: &Framebuffer| {}),
            trace: Box::new(|_: &str| {}),
            sound: Box::new(|| {}),
        }
    }
}
