//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter    | Implements   | Connects to                        |
//! |------------|--------------|------------------------------------|
//! | `gpio`     | SensorPort   | sysfs GPIO digital input           |
//! | `mqtt_pub` | PublishPort  | broker via one-shot sessions       |
//! | `camera`   | CameraPort   | external capture program           |
//! | `notify`   | NotifierPort | external push-delivery program     |
//! | `clock`    | ClockPort    | system wall clock                  |
//! | `log_sink` | EventSink    | the log facade                     |

pub mod camera;
pub mod clock;
pub mod gpio;
pub mod log_sink;
pub mod mqtt_pub;
pub mod notify;
