//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    const ALL: [ObdProtocol; 10] = [
        ObdProtocol::Auto,
        ObdProtocol::J1850Pwm,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::Iso15765_4Can29bit250,
    ];

    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "ATSP0",
            ObdProtocol::J1850Pwm => "ATSP1",
            ObdProtocol::J1850Vpw => "ATSP2",
            ObdProtocol::Iso9141_2 => "ATSP3",
            ObdProtocol::Iso14230_4Kwp => "ATSP4",
            ObdProtocol::Iso14230_4KwpFast => "ATSP5",
            ObdProtocol::Iso15765_4Can11bit500 => "ATSP6",
            ObdProtocol::Iso15765_4Can29bit500 => "ATSP7",
            ObdProtocol::Iso15765_4Can11bit250 => "ATSP8",
            ObdProtocol::Iso15765_4Can29bit250 => "ATSP9",
        }
    }

    /// Canonical protocol name, as ELM327 reports it through `ATDP`.
    ///
    /// This string feeds the vehicle signature hash and must stay stable.
    pub fn name(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "AUTO",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 (KWP 5BAUD)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 (KWP FAST)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 (CAN 11/500)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 (CAN 29/500)",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 (CAN 11/250)",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 (CAN 29/250)",
        }
    }

    /// Parse an `ATDP` description such as `AUTO, ISO 15765-4 (CAN 11/500)`
    pub fn from_description(text: &str) -> Option<Self> {
        let cleaned = text.trim().trim_start_matches("AUTO,").trim();
        if cleaned.is_empty() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(cleaned))
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_description() {
        assert_eq!(
            ObdProtocol::from_description("AUTO, ISO 15765-4 (CAN 11/500)"),
            Some(ObdProtocol::Iso15765_4Can11bit500)
        );
        assert_eq!(
            ObdProtocol::from_description("ISO 9141-2"),
            Some(ObdProtocol::Iso9141_2)
        );
        assert_eq!(ObdProtocol::from_description("AUTO,"), None);
        assert_eq!(ObdProtocol::from_description("SOMETHING ELSE"), None);
    }

    #[test]
    fn test_is_can() {
        assert!(ObdProtocol::Iso15765_4Can29bit250.is_can());
        assert!(!ObdProtocol::J1850Pwm.is_can());
    }
}
