//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                    |
//! |-------------|---------------|--------------------------------|
//! | `hardware`  | SafetyPort    | TWDT, buzzer LEDC, status LED  |
//! | `log_sink`  | EventSink     | Serial log output              |
//! | `profiles`  | ProfileStore  | Built-in profile table         |
//! | `settings`  | SettingsStore | NVS / in-memory store          |
//! | `time`      | -             | ESP32 high-resolution timer    |

pub mod hardware;
pub mod log_sink;
pub mod profiles;
pub mod settings;
pub mod time;
