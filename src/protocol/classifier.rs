//! Message classification
//!
//! Maps an encapsulated message id to a priority tier, a blacklist decision and
//! an "essential" flag, and enforces per-id minimum send intervals. The tables
//! are closed sets of numeric ids; anything unlisted is routine traffic.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::Tier;

/// Well-known message ids of the encapsulated protocol
pub mod ids {
    pub const HEARTBEAT: u32 = 0;
    pub const SYS_STATUS: u32 = 1;
    pub const SET_MODE: u32 = 11;
    pub const PARAM_VALUE: u32 = 22;
    pub const PARAM_SET: u32 = 23;
    pub const GPS_RAW_INT: u32 = 24;
    pub const SCALED_IMU: u32 = 26;
    pub const RAW_IMU: u32 = 27;
    pub const RAW_PRESSURE: u32 = 28;
    pub const SCALED_PRESSURE: u32 = 29;
    pub const ATTITUDE: u32 = 30;
    pub const ATTITUDE_QUATERNION: u32 = 31;
    pub const LOCAL_POSITION_NED: u32 = 32;
    pub const GLOBAL_POSITION_INT: u32 = 33;
    pub const RC_CHANNELS_SCALED: u32 = 34;
    pub const RC_CHANNELS_RAW: u32 = 35;
    pub const SERVO_OUTPUT_RAW: u32 = 36;
    pub const MISSION_ITEM: u32 = 39;
    pub const MISSION_REQUEST: u32 = 40;
    pub const MISSION_SET_CURRENT: u32 = 41;
    pub const MISSION_CURRENT: u32 = 42;
    pub const MISSION_REQUEST_LIST: u32 = 43;
    pub const MISSION_COUNT: u32 = 44;
    pub const MISSION_CLEAR_ALL: u32 = 45;
    pub const MISSION_ACK: u32 = 47;
    pub const MISSION_REQUEST_INT: u32 = 51;
    pub const NAV_CONTROLLER_OUTPUT: u32 = 62;
    pub const RC_CHANNELS: u32 = 65;
    pub const MISSION_ITEM_INT: u32 = 73;
    pub const VFR_HUD: u32 = 74;
    pub const COMMAND_INT: u32 = 75;
    pub const COMMAND_LONG: u32 = 76;
    pub const COMMAND_ACK: u32 = 77;
    pub const HIGHRES_IMU: u32 = 105;
    pub const TIMESYNC: u32 = 111;
    pub const SCALED_IMU2: u32 = 116;
    pub const POWER_STATUS: u32 = 125;
    pub const SCALED_IMU3: u32 = 129;
    pub const DISTANCE_SENSOR: u32 = 132;
    pub const BATTERY_STATUS: u32 = 147;
    pub const VIBRATION: u32 = 241;
    pub const HOME_POSITION: u32 = 242;
    pub const EXTENDED_SYS_STATE: u32 = 245;
    pub const STATUSTEXT: u32 = 253;
}

use self::ids::*;

const CRITICAL_IDS: &[u32] = &[
    SET_MODE,
    PARAM_SET,
    MISSION_ITEM,
    MISSION_REQUEST,
    MISSION_SET_CURRENT,
    MISSION_REQUEST_LIST,
    MISSION_COUNT,
    MISSION_CLEAR_ALL,
    MISSION_ACK,
    MISSION_REQUEST_INT,
    MISSION_ITEM_INT,
    COMMAND_INT,
    COMMAND_LONG,
    COMMAND_ACK,
];

const IMPORTANT_IDS: &[u32] = &[
    HEARTBEAT,
    SYS_STATUS,
    PARAM_VALUE,
    GPS_RAW_INT,
    ATTITUDE,
    GLOBAL_POSITION_INT,
    MISSION_CURRENT,
    VFR_HUD,
    BATTERY_STATUS,
    HOME_POSITION,
    EXTENDED_SYS_STATE,
    STATUSTEXT,
];

/// High-rate sensor streams that never fit the narrowband budget
const BLACKLISTED_IDS: &[u32] = &[
    SCALED_IMU,
    RAW_IMU,
    RAW_PRESSURE,
    SCALED_PRESSURE,
    ATTITUDE_QUATERNION,
    LOCAL_POSITION_NED,
    RC_CHANNELS_SCALED,
    RC_CHANNELS_RAW,
    SERVO_OUTPUT_RAW,
    NAV_CONTROLLER_OUTPUT,
    RC_CHANNELS,
    HIGHRES_IMU,
    TIMESYNC,
    SCALED_IMU2,
    POWER_STATUS,
    SCALED_IMU3,
    DISTANCE_SENSOR,
    VIBRATION,
];

/// Ids that also traverse the constrained channel in dual-band mode
const ESSENTIAL_IDS: &[u32] = &[
    HEARTBEAT,
    SYS_STATUS,
    SET_MODE,
    PARAM_SET,
    GLOBAL_POSITION_INT,
    MISSION_ITEM,
    MISSION_REQUEST,
    MISSION_SET_CURRENT,
    MISSION_REQUEST_LIST,
    MISSION_COUNT,
    MISSION_CLEAR_ALL,
    MISSION_ACK,
    MISSION_REQUEST_INT,
    MISSION_ITEM_INT,
    COMMAND_INT,
    COMMAND_LONG,
    COMMAND_ACK,
    HOME_POSITION,
    STATUSTEXT,
];

/// Minimum interval between two accepted sends of the same id, in milliseconds
const RATE_LIMITS_MS: &[(u32, u64)] = &[
    (HEARTBEAT, 1000),
    (SYS_STATUS, 2000),
    (GPS_RAW_INT, 1000),
    (ATTITUDE, 200),
    (GLOBAL_POSITION_INT, 500),
    (MISSION_CURRENT, 1000),
    (VFR_HUD, 500),
    (BATTERY_STATUS, 5000),
    (EXTENDED_SYS_STATE, 2000),
];

/// Result of classifying a message id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub tier: Tier,
    pub blacklisted: bool,
    pub essential: bool,
}

impl Classification {
    /// Classification used for payloads without a recognisable header
    pub const UNKNOWN: Classification = Classification {
        tier: Tier::ROUTINE,
        blacklisted: false,
        essential: false,
    };
}

/// Classifies a message id against the fixed tables
pub fn classify(message_id: u32) -> Classification {
    let tier = if CRITICAL_IDS.contains(&message_id) {
        Tier::CRITICAL
    } else if IMPORTANT_IDS.contains(&message_id) {
        Tier::IMPORTANT
    } else {
        Tier::ROUTINE
    };

    Classification {
        tier,
        blacklisted: BLACKLISTED_IDS.contains(&message_id),
        essential: ESSENTIAL_IDS.contains(&message_id),
    }
}

/// Returns the configured minimum send interval for an id
pub fn min_interval(message_id: u32) -> Option<Duration> {
    RATE_LIMITS_MS
        .iter()
        .find(|(id, _)| *id == message_id)
        .map(|(_, ms)| Duration::from_millis(*ms))
}

/// Classifier with the per-id send history used for rate limiting
#[derive(Debug, Default)]
pub struct Classifier {
    last_sent: HashMap<u32, Instant>,
}

impl Classifier {
    /// Creates a classifier with empty send history
    pub fn new() -> Self {
        Classifier::default()
    }

    /// Classifies a message id
    pub fn classify(&self, message_id: u32) -> Classification {
        classify(message_id)
    }

    /// Returns whether a send of `message_id` at `now` must be rejected.
    ///
    /// An accepted send is recorded, so the next one is measured from `now`.
    /// Ids without a configured interval are never limited.
    pub fn should_rate_limit(&mut self, message_id: u32, now: Instant) -> bool {
        if self.is_limited(message_id, now) {
            return true;
        }
        self.record_send(message_id, now);
        false
    }

    /// Checks the interval since the last recorded send without recording
    pub fn is_limited(&self, message_id: u32, now: Instant) -> bool {
        match (min_interval(message_id), self.last_sent.get(&message_id)) {
            (Some(interval), Some(last)) => now.saturating_duration_since(*last) < interval,
            _ => false,
        }
    }

    /// Starts a new interval for `message_id` at `now`
    pub fn record_send(&mut self, message_id: u32, now: Instant) {
        if min_interval(message_id).is_some() {
            self.last_sent.insert(message_id, now);
        }
    }
}
