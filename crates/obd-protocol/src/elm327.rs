//! ELM327 response parsing
//!
//! Pure functions over the text an ELM327 returns before its `>` prompt.
//! They are kept free of I/O so they can be tested without an adapter.

use crate::error::ObdError;
use crate::mode;

/// Strip the prompt, echo noise and search banners from raw adapter text
pub fn clean_response(raw: &str) -> String {
    raw.replace('>', "")
        .replace("SEARCHING...", "")
        .replace("BUS INIT: ...", "")
        .trim()
        .to_string()
}

/// Split adapter text into per-line byte frames.
///
/// CAN multi-frame prefixes (`0:`, `1:`) are dropped, and lines that are not
/// an even run of hex digits (such as the `014` length header) are skipped.
fn hex_lines(text: &str) -> Vec<Vec<u8>> {
    text.split(['\r', '\n'])
        .filter_map(|line| {
            let payload = match line.split_once(':') {
                Some((_, rest)) => rest,
                None => line,
            };
            let digits: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            if digits.is_empty() || digits.len() % 2 != 0 {
                return None;
            }
            if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            (0..digits.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
                .collect::<Option<Vec<u8>>>()
        })
        .collect()
}

fn adapter_error(text: &str) -> Option<ObdError> {
    let upper = text.to_ascii_uppercase();
    if upper.contains("UNABLE TO CONNECT") {
        Some(ObdError::VehicleNotConnected)
    } else if upper.contains("CAN ERROR") || upper.contains("BUS ERROR") {
        Some(ObdError::CanBusError(text.to_string()))
    } else if upper.contains("STOPPED") || upper.trim() == "?" {
        Some(ObdError::InvalidResponse(text.to_string()))
    } else {
        None
    }
}

/// Extract the data bytes for a Mode 01 PID query.
///
/// Returns `Ok(None)` for `NO DATA`, which is a missing value rather than a
/// link failure.
pub fn parse_pid_payload(raw: &str, pid: u8) -> Result<Option<Vec<u8>>, ObdError> {
    let text = clean_response(raw);
    if text.to_ascii_uppercase().contains("NO DATA") {
        return Ok(None);
    }
    if let Some(err) = adapter_error(&text) {
        return Err(err);
    }

    let header = [mode::CURRENT_DATA + mode::RESPONSE_OFFSET, pid];
    // First ECU to answer wins
    for frame in hex_lines(&text) {
        if let Some(pos) = frame.windows(2).position(|w| w == header) {
            return Ok(Some(frame[pos + 2..].to_vec()));
        }
    }
    Err(ObdError::InvalidResponse(text))
}

/// Decode a 4-byte PID support bitmap answered for `base` (0x00, 0x20, ...)
pub fn parse_supported_bitmap(base: u8, payload: &[u8]) -> Vec<u8> {
    let mut pids = Vec::new();
    for (byte_index, byte) in payload.iter().take(4).enumerate() {
        for bit in 0..8 {
            if byte & (0x80 >> bit) != 0 {
                let offset = (byte_index * 8 + bit + 1) as u8;
                pids.push(base.wrapping_add(offset));
            }
        }
    }
    pids
}

/// Extract a VIN from a Mode 09 PID 02 answer.
///
/// Handles both CAN multi-frame output and the legacy format where every
/// line repeats the `49 02 NN` header.
pub fn parse_vin(raw: &str) -> Option<String> {
    let text = clean_response(raw);
    if text.to_ascii_uppercase().contains("NO DATA") || adapter_error(&text).is_some() {
        return None;
    }
    let header = [mode::VEHICLE_INFO + mode::RESPONSE_OFFSET, 0x02];
    let frames = hex_lines(&text);

    let legacy = frames.len() > 1 && frames.iter().all(|f| f.starts_with(&header));
    let data: Vec<u8> = if legacy {
        frames.iter().flat_map(|f| f.iter().skip(3).copied()).collect()
    } else {
        let joined: Vec<u8> = frames.concat();
        let pos = joined.windows(2).position(|w| w == header)?;
        // skip header and the message count byte
        joined.iter().skip(pos + 3).copied().collect()
    };

    let chars: String = data
        .into_iter()
        .filter(|b| b.is_ascii_alphanumeric())
        .map(char::from)
        .collect();
    if chars.len() < 17 {
        return None;
    }
    Some(chars[chars.len() - 17..].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_rpm_payload() {
        let payload = parse_pid_payload("41 0C 1A F8 \r\r>", 0x0C).unwrap();
        assert_eq!(payload, Some(vec![0x1A, 0xF8]));
    }

    #[test]
    fn test_parse_payload_without_spaces_and_banner() {
        let payload = parse_pid_payload("SEARCHING...\r410D37\r\r>", 0x0D).unwrap();
        assert_eq!(payload, Some(vec![0x37]));
    }

    #[test]
    fn test_no_data_is_null() {
        assert_eq!(parse_pid_payload("NO DATA\r\r>", 0x2F).unwrap(), None);
    }

    #[test]
    fn test_unable_to_connect_is_error() {
        let err = parse_pid_payload("UNABLE TO CONNECT\r>", 0x0C).unwrap_err();
        assert!(matches!(err, ObdError::VehicleNotConnected));
        assert!(err.is_link_failure());
    }

    #[test]
    fn test_garbage_is_invalid() {
        let err = parse_pid_payload("41 0D 20\r>", 0x0C).unwrap_err();
        assert!(matches!(err, ObdError::InvalidResponse(_)));
    }

    #[test]
    fn test_supported_bitmap() {
        // BE 1F A8 13 is a common answer to 0100
        let pids = parse_supported_bitmap(0x00, &[0xBE, 0x1F, 0xA8, 0x13]);
        assert!(pids.contains(&0x01));
        assert!(pids.contains(&0x0C));
        assert!(pids.contains(&0x0D));
        assert!(pids.contains(&0x20));
        assert!(!pids.contains(&0x02));

        let pids = parse_supported_bitmap(0x20, &[0x80, 0x00, 0x00, 0x01]);
        assert_eq!(pids, vec![0x21, 0x40]);
    }

    #[test]
    fn test_parse_vin_can() {
        let raw = "014\r0: 49 02 01 31 44 34\r1: 47 50 30 30 52 35 35\r2: 42 31 32 33 34 35 36\r\r>";
        assert_eq!(parse_vin(raw).as_deref(), Some("1D4GP00R55B123456"));
    }

    #[test]
    fn test_parse_vin_legacy() {
        let raw = "49 02 01 00 00 00 31\r49 02 02 44 34 47 50\r49 02 03 30 30 52 35\r49 02 04 35 42 31 32\r49 02 05 33 34 35 36\r>";
        assert_eq!(parse_vin(raw).as_deref(), Some("1D4GP00R55B123456"));
    }

    #[test]
    fn test_parse_vin_no_data() {
        assert_eq!(parse_vin("NO DATA\r>"), None);
    }

    proptest! {
        #[test]
        fn prop_parsers_never_panic(raw in "[ -~\r\n]{0,80}", pid in any::<u8>()) {
            let _ = parse_pid_payload(&raw, pid);
            let _ = parse_vin(&raw);
        }

        #[test]
        fn prop_bitmap_round_trip(bits in any::<u32>()) {
            let pids = parse_supported_bitmap(0x00, &bits.to_be_bytes());
            prop_assert_eq!(pids.len() as u32, bits.count_ones());
            for pid in pids {
                prop_assert!(bits & (1 << (32 - pid as u32)) != 0);
            }
        }
    }
}
