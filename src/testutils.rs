//! Scripted card on a shared bus for driving whole command sequences.

use crate::consts::tokens::IDLE_FILL;

use core::convert::Infallible;
use embedded_hal::blocking::{delay::DelayMs, spi::Transfer};
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};
use switch_hal::OutputSwitch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Select(bool),
    Exchange { out: u8, rx: u8 },
    Delay(u8),
}

#[derive(Default)]
pub struct Bus {
    pub selected: bool,
    pub log: Vec<BusEvent>,
    pub frames: Vec<[u8; 6]>,
    frame: Vec<u8>,
    pending: VecDeque<u8>,
    scripted: HashMap<u8, VecDeque<Vec<u8>>>,
    fallback: HashMap<u8, Vec<u8>>,
}

impl Bus {
    fn exchange(&mut self, out: u8) -> u8 {
        let rx = self.respond(out);
        self.log.push(BusEvent::Exchange { out, rx });
        rx
    }

    fn respond(&mut self, out: u8) -> u8 {
        if !self.selected {
            return IDLE_FILL;
        }

        if !self.frame.is_empty() || out & 0xC0 == 0x40 {
            self.frame.push(out);
            if self.frame.len() == 6 {
                let mut frame = [0; 6];
                frame.copy_from_slice(&self.frame);
                self.frame.clear();
                self.frames.push(frame);

                let index = frame[0] & 0x3F;
                let response = self
                    .scripted
                    .get_mut(&index)
                    .and_then(VecDeque::pop_front)
                    .or_else(|| self.fallback.get(&index).cloned())
                    .unwrap_or_default();
                self.pending = response.into();
            }
            return IDLE_FILL;
        }

        self.pending.pop_front().unwrap_or(IDLE_FILL)
    }

    fn select(&mut self, selected: bool) {
        self.selected = selected;
        if !selected {
            self.frame.clear();
            self.pending.clear();
        }
        self.log.push(BusEvent::Select(selected));
    }

    pub fn frames_for(&self, index: u8) -> usize {
        self.frames.iter().filter(|f| f[0] & 0x3F == index).count()
    }

    pub fn delays(&self) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|e| match e {
                BusEvent::Delay(ms) => Some(*ms),
                _ => None,
            })
            .collect()
    }
}

/// Card answering frames from per-command scripts.
#[derive(Clone, Default)]
pub struct FakeCard {
    bus: Rc<RefCell<Bus>>,
}

impl FakeCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the bytes answering the next frame of command `index`. An empty
    /// response leaves the card silent.
    pub fn script(&self, index: u8, response: &[u8]) -> &Self {
        self.bus
            .borrow_mut()
            .scripted
            .entry(index)
            .or_default()
            .push_back(response.to_vec());
        self
    }

    /// Answer used for command `index` once its script is drained.
    pub fn always(&self, index: u8, response: &[u8]) -> &Self {
        self.bus
            .borrow_mut()
            .fallback
            .insert(index, response.to_vec());
        self
    }

    pub fn select_pin(&self) -> FakeSelect {
        FakeSelect {
            bus: self.bus.clone(),
        }
    }

    pub fn delay(&self) -> FakeDelay {
        FakeDelay {
            bus: self.bus.clone(),
        }
    }

    pub fn bus(&self) -> std::cell::Ref<'_, Bus> {
        self.bus.borrow()
    }
}

impl Transfer<u8> for FakeCard {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        let mut bus = self.bus.borrow_mut();
        for word in words.iter_mut() {
            *word = bus.exchange(*word);
        }
        Ok(words)
    }
}

pub struct FakeSelect {
    bus: Rc<RefCell<Bus>>,
}

impl OutputSwitch for FakeSelect {
    type Error = Infallible;

    fn on(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().select(true);
        Ok(())
    }

    fn off(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().select(false);
        Ok(())
    }
}

pub struct FakeDelay {
    bus: Rc<RefCell<Bus>>,
}

impl DelayMs<u8> for FakeDelay {
    fn delay_ms(&mut self, ms: u8) {
        self.bus.borrow_mut().log.push(BusEvent::Delay(ms));
    }
}

/// Select pin that ignores everything, for tests that drive the SPI mock.
pub struct NoSelect;

impl OutputSwitch for NoSelect {
    type Error = Infallible;

    fn on(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn off(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
