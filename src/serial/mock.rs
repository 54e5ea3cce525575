//! Scriptable serial driver for tests

use super::channel::ConfigureStep;
use super::link::{
    EventMask, FlowPolicy, LineControl, LinkHandle, SerialDriver, SpecialChars,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Port name valid on the current platform
pub fn test_port(n: u32) -> String {
    if cfg!(windows) {
        format!("COM{}", 10 + n)
    } else {
        format!("/dev/ttyMOCK{}", n)
    }
}

#[derive(Default)]
struct MockState {
    ports: HashSet<String>,
    fail_steps: HashMap<String, ConfigureStep>,
    fail_writes: HashSet<String>,
    live: usize,
    applied: HashMap<String, LineControl>,
    purged: HashSet<String>,
    inbound: HashMap<String, VecDeque<u8>>,
    written: HashMap<String, Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&self, port: &str) {
        self.state.lock().unwrap().ports.insert(port.to_string());
    }

    pub fn fail_at(&self, port: &str, step: ConfigureStep) {
        self.state
            .lock()
            .unwrap()
            .fail_steps
            .insert(port.to_string(), step);
    }

    pub fn fail_writes(&self, port: &str) {
        self.state.lock().unwrap().fail_writes.insert(port.to_string());
    }

    pub fn push_inbound(&self, port: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .inbound
            .entry(port.to_string())
            .or_default()
            .extend(data.iter().copied());
    }

    pub fn live_handles(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub fn applied(&self, port: &str) -> Option<LineControl> {
        self.state.lock().unwrap().applied.get(port).copied()
    }

    pub fn purged(&self, port: &str) -> bool {
        self.state.lock().unwrap().purged.contains(port)
    }

    pub fn written(&self, port: &str) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .written
            .get(port)
            .cloned()
            .unwrap_or_default()
    }
}

impl SerialDriver for MockDriver {
    fn acquire(&self, port: &str, baud_rate: u32) -> serialport::Result<Box<dyn LinkHandle>> {
        let mut state = self.state.lock().unwrap();
        if !state.ports.contains(port) {
            return Err(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                format!("no such port: {}", port),
            ));
        }
        state.live += 1;
        Ok(Box::new(MockHandle {
            port: port.to_string(),
            state: Arc::clone(&self.state),
            control: LineControl {
                baud_rate,
                data_bits: serialport::DataBits::Eight,
                stop_bits: serialport::StopBits::One,
                parity: serialport::Parity::None,
            },
            timeout: Duration::from_millis(30),
        }))
    }
}

struct MockHandle {
    port: String,
    state: Arc<Mutex<MockState>>,
    control: LineControl,
    timeout: Duration,
}

impl MockHandle {
    fn step(&self, step: ConfigureStep) -> serialport::Result<()> {
        match self.state.lock().unwrap().fail_steps.get(&self.port) {
            Some(failing) if *failing == step => Err(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                format!("injected failure: {}", step),
            )),
            _ => Ok(()),
        }
    }
}

impl LinkHandle for MockHandle {
    fn set_queue_sizes(&mut self, _rx: u32, _tx: u32) -> serialport::Result<()> {
        self.step(ConfigureStep::QueueSizes)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        self.step(ConfigureStep::ReadTimeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn set_event_mask(&mut self, _mask: EventMask) -> serialport::Result<()> {
        self.step(ConfigureStep::EventMask)
    }

    fn line_control(&self) -> serialport::Result<LineControl> {
        self.step(ConfigureStep::GetLineControl)?;
        Ok(self.control)
    }

    fn set_line_control(&mut self, control: &LineControl) -> serialport::Result<()> {
        self.step(ConfigureStep::SetLineControl)?;
        self.control = *control;
        self.state
            .lock()
            .unwrap()
            .applied
            .insert(self.port.clone(), *control);
        Ok(())
    }

    fn set_special_chars(&mut self, _chars: &SpecialChars) -> serialport::Result<()> {
        self.step(ConfigureStep::SpecialChars)
    }

    fn set_flow_policy(&mut self, _policy: &FlowPolicy) -> serialport::Result<()> {
        self.step(ConfigureStep::FlowControl)
    }

    fn purge(&mut self) -> serialport::Result<()> {
        self.step(ConfigureStep::Purge)?;
        let mut state = self.state.lock().unwrap();
        state.purged.insert(self.port.clone());
        state.inbound.remove(&self.port);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(queue) = state.inbound.get_mut(&self.port) {
                if !queue.is_empty() {
                    let n = buffer.len().min(queue.len());
                    for (slot, byte) in buffer.iter_mut().zip(queue.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
        }
        std::thread::sleep(self.timeout);
        Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes.contains(&self.port) {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "injected write failure"));
        }
        state
            .written
            .entry(self.port.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live -= 1;
        }
    }
}
