//! # Telemetry Samples
//!
//! One [`Sample`] is one CSV row: capture time, a label, gyro and
//! accelerometer readings, the session id and (with audio enabled) the name
//! of the companion WAV file.
//!
//! ## Column Layout
//!
//! | Column | Content |
//! |--------|---------|
//! | timestamp | Local wall clock, `YYYY-MM-DDTHH:MM:SS.ffffff` |
//! | button_press | Pressed buttons (`cross,L1`), `none`, or `EVENT:<name>` |
//! | gyro_pitch, gyro_yaw, gyro_roll | deg/s |
//! | acc_x, acc_y, acc_z | g |
//! | user_id | Session id |
//! | audio_file | WAV file name (audio sessions only) |

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::controller::buttons::ButtonSet;
use crate::controller::mapper::{Accel, Gyro};
use crate::controller::source::SensorReading;

/// Prefix that marks an event row in the label column.
pub const EVENT_PREFIX: &str = "EVENT:";

/// Timestamp column format (ISO-8601 with microseconds).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const BASE_COLUMNS: [&str; 9] = [
    "timestamp",
    "button_press",
    "gyro_pitch",
    "gyro_yaw",
    "gyro_roll",
    "acc_x",
    "acc_y",
    "acc_z",
    "user_id",
];

const AUDIO_COLUMN: &str = "audio_file";

/// Header row for a session file.
pub fn header(with_audio: bool) -> Vec<&'static str> {
    let mut columns = BASE_COLUMNS.to_vec();
    if with_audio {
        columns.push(AUDIO_COLUMN);
    }
    columns
}

/// What a row describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// Buttons held when the sample was taken
    Buttons(ButtonSet),
    /// Externally tagged event
    Event(String),
}

impl Label {
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self, Label::Event(_))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Buttons(buttons) => write!(f, "{}", buttons),
            Label::Event(name) => write!(f, "{}{}", EVENT_PREFIX, name),
        }
    }
}

/// One telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub label: Label,
    pub gyro: Gyro,
    pub accel: Accel,
    pub session_id: Arc<str>,
    pub audio_file: Option<Arc<str>>,
}

impl Sample {
    /// Builds a sample from `reading`, stamped with the current time.
    pub fn capture(
        reading: &SensorReading,
        label: Label,
        session_id: &Arc<str>,
        audio_file: Option<&Arc<str>>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            label,
            gyro: reading.gyro,
            accel: reading.accel,
            session_id: Arc::clone(session_id),
            audio_file: audio_file.cloned(),
        }
    }

    /// CSV fields in header order.
    pub fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.label.to_string(),
            self.gyro.pitch.to_string(),
            self.gyro.yaw.to_string(),
            self.gyro.roll.to_string(),
            self.accel.x.to_string(),
            self.accel.y.to_string(),
            self.accel.z.to_string(),
            self.session_id.to_string(),
        ];
        if let Some(audio_file) = &self.audio_file {
            record.push(audio_file.to_string());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::buttons::Button;
    use chrono::TimeZone;

    fn reading() -> SensorReading {
        SensorReading {
            buttons: [Button::Cross, Button::L1].into_iter().collect(),
            gyro: Gyro { pitch: 1.5, yaw: -2.0, roll: 0.25 },
            accel: Accel { x: 0.0, y: -1.0, z: 0.125 },
        }
    }

    #[test]
    fn test_header_columns() {
        assert_eq!(
            header(false),
            [
                "timestamp",
                "button_press",
                "gyro_pitch",
                "gyro_yaw",
                "gyro_roll",
                "acc_x",
                "acc_y",
                "acc_z",
                "user_id"
            ]
        );
        assert_eq!(header(true).len(), 10);
        assert_eq!(header(true)[9], "audio_file");
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Buttons(ButtonSet::new()).to_string(), "none");
        assert_eq!(Label::Event("pin_entered".to_string()).to_string(), "EVENT:pin_entered");
        assert!(Label::Event("x".to_string()).is_event());
        assert!(!Label::Buttons(ButtonSet::new()).is_event());
    }

    #[test]
    fn test_record_fields() {
        let session: Arc<str> = Arc::from("test_user");
        let label = Label::Buttons(reading().buttons);
        let mut sample = Sample::capture(&reading(), label, &session, None);
        sample.timestamp = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();

        assert_eq!(
            sample.to_record(),
            [
                "2024-03-05T14:07:09.000000",
                "cross,L1",
                "1.5",
                "-2",
                "0.25",
                "0",
                "-1",
                "0.125",
                "test_user"
            ]
        );
    }

    #[test]
    fn test_record_with_audio_reference() {
        let session: Arc<str> = Arc::from("p01");
        let audio: Arc<str> = Arc::from("audio_p01_20240305_140709.wav");
        let sample = Sample::capture(
            &reading(),
            Label::Event("start".to_string()),
            &session,
            Some(&audio),
        );

        let record = sample.to_record();
        assert_eq!(record.len(), header(true).len());
        assert_eq!(record[1], "EVENT:start");
        assert_eq!(record[9], "audio_p01_20240305_140709.wav");
    }

    #[test]
    fn test_capture_uses_reading_values() {
        let session: Arc<str> = Arc::from("s");
        let sample = Sample::capture(&reading(), Label::Buttons(ButtonSet::new()), &session, None);
        assert_eq!(sample.gyro, reading().gyro);
        assert_eq!(sample.accel, reading().accel);
        assert_eq!(&*sample.session_id, "s");
        assert!(sample.audio_file.is_none());
    }
}
