use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the serial link.
///
/// ```text
/// Disconnected --connect--> Connecting --success--> Connected
///      ^                        |                       |
///      |                     failure              read errors
///      |                        v                       v
///      +-------reset-------- Error <--------------------+
///      +------------------disconnect--------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No port is open.
    Disconnected,
    /// A connect sequence is in flight.
    Connecting,
    /// Reader, consumer and ticker are running.
    Connected,
    /// The last connect failed or the reader gave up.
    Error,
}

impl ConnectionState {
    /// Check whether a transition from this state to `target` is allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use probelink_core::ConnectionState;
    ///
    /// assert!(ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connecting));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connected));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            // From Disconnected
            (ConnectionState::Disconnected, ConnectionState::Connecting)
            // From Connecting
            | (ConnectionState::Connecting, ConnectionState::Connected | ConnectionState::Error | ConnectionState::Disconnected)
            // From Connected
            | (ConnectionState::Connected, ConnectionState::Disconnected | ConnectionState::Error)
            // From Error
            | (ConnectionState::Error, ConnectionState::Disconnected)
        )
    }

    /// Returns `true` when a port handle may be held in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        };
        write!(f, "{}", state_str)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line parameters applied right after a port is opened.
///
/// # Examples
///
/// ```
/// use probelink_core::{DataBits, LineParameters, Parity, StopBits};
///
/// let params = LineParameters::new(115_200);
/// assert_eq!(params.data_bits, DataBits::Eight);
/// assert_eq!(params.stop_bits, StopBits::One);
/// assert_eq!(params.parity, Parity::None);
/// assert_eq!(params.to_string(), "115200 8N1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineParameters {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl LineParameters {
    /// 8N1 at the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl fmt::Display for LineParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {}{}{}", self.baud_rate, bits, parity, stop)
    }
}
