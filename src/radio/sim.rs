//! In-memory radio for host tests and bench setups
//!
//! Clones share state, so a test can keep one handle while a transceiver owns
//! another, then inject receptions and inspect what went on the air.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Error, Result};
use super::{ChannelActivity, RadioDriver, RxHandle};

#[derive(Debug)]
struct SimState {
    sent: Vec<Vec<u8>>,
    scripted_activity: VecDeque<ChannelActivity>,
    channel_busy: bool,
    cad_available: bool,
    rssi_dbm: f32,
    snr_db: f32,
    failures_pending: u32,
    always_fail: bool,
    receiving: bool,
    standby_count: u32,
    resets: u32,
    handler: Option<RxHandle>,
}

/// Scriptable radio that records every transmitted frame
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        SimulatedRadio::new()
    }
}

impl SimulatedRadio {
    /// A quiet channel and a radio that never fails
    pub fn new() -> Self {
        SimulatedRadio {
            state: Arc::new(Mutex::new(SimState {
                sent: Vec::new(),
                scripted_activity: VecDeque::new(),
                channel_busy: false,
                cad_available: true,
                rssi_dbm: -120.0,
                snr_db: 10.0,
                failures_pending: 0,
                always_fail: false,
                receiving: false,
                standby_count: 0,
                resets: 0,
                handler: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every activity scan report busy (or free)
    pub fn set_channel_busy(&self, busy: bool) {
        self.lock().channel_busy = busy;
    }

    /// Queues scan results consumed before the persistent busy/free state applies
    pub fn script_activity(&self, activity: impl IntoIterator<Item = ChannelActivity>) {
        self.lock().scripted_activity.extend(activity);
    }

    /// Disables hardware activity detection so scans report an error
    pub fn set_cad_available(&self, available: bool) {
        self.lock().cad_available = available;
    }

    /// Sets the energy level reported by RSSI sampling
    pub fn set_rssi(&self, rssi_dbm: f32) {
        self.lock().rssi_dbm = rssi_dbm;
    }

    /// Fails the next `count` transmissions
    pub fn fail_transmits(&self, count: u32) {
        self.lock().failures_pending = count;
    }

    /// Fails every transmission until cleared
    pub fn set_always_fail(&self, fail: bool) {
        self.lock().always_fail = fail;
    }

    /// Delivers a packet as if it had been received over the air
    pub fn inject(&self, raw: &[u8]) {
        let (rssi, snr) = {
            let state = self.lock();
            (state.rssi_dbm, state.snr_db)
        };
        self.inject_with_metadata(raw, rssi, snr);
    }

    /// Delivers a packet with explicit link metadata
    pub fn inject_with_metadata(&self, raw: &[u8], rssi_dbm: f32, snr_db: f32) {
        // Release the lock before calling out, as a real interrupt would not hold it
        let handler = self.lock().handler.clone();
        if let Some(handler) = handler {
            handler.on_receive(raw, rssi_dbm, snr_db);
        }
    }

    /// Frames transmitted so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Removes and returns the frames transmitted so far
    pub fn drain_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().sent)
    }

    pub fn is_receiving(&self) -> bool {
        self.lock().receiving
    }

    pub fn standby_count(&self) -> u32 {
        self.lock().standby_count
    }

    pub fn reset_count(&self) -> u32 {
        self.lock().resets
    }
}

impl RadioDriver for SimulatedRadio {
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.receiving = false;
        if state.always_fail {
            return Err(Error::radio("simulated transmit failure"));
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(Error::radio("simulated transmit failure"));
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn start_receive(&mut self) -> Result<()> {
        self.lock().receiving = true;
        Ok(())
    }

    fn standby(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.receiving = false;
        state.standby_count += 1;
        Ok(())
    }

    fn scan_channel_activity(&mut self) -> ChannelActivity {
        let mut state = self.lock();
        if !state.cad_available {
            return ChannelActivity::Error;
        }
        if let Some(activity) = state.scripted_activity.pop_front() {
            return activity;
        }
        if state.channel_busy {
            ChannelActivity::Busy
        } else {
            ChannelActivity::Free
        }
    }

    fn rssi_dbm(&mut self) -> f32 {
        self.lock().rssi_dbm
    }

    fn snr_db(&mut self) -> f32 {
        self.lock().snr_db
    }

    fn set_receive_handler(&mut self, handler: RxHandle) {
        self.lock().handler = Some(handler);
    }

    fn reset(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.resets += 1;
        state.receiving = false;
        state.always_fail = false;
        state.failures_pending = 0;
        Ok(())
    }
}
