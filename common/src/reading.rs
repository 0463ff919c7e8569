use crate::errors::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One device reading as carried on the wire: `"<temperature> <battery>"`.
///
/// The device id travels as the message key, never inside the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub battery: f64,
}

impl Reading {
    pub fn new(temperature: f64, battery: f64) -> Self {
        Self {
            temperature,
            battery,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {:.2}", self.temperature, self.battery)
    }
}

impl FromStr for Reading {
    type Err = Error;

    fn from_str(payload: &str) -> Result<Self> {
        let mut fields = payload.split_whitespace();
        let temperature = parse_field(fields.next(), "temperature", payload)?;
        let battery = parse_field(fields.next(), "battery", payload)?;
        Ok(Self {
            temperature,
            battery,
        })
    }
}

fn parse_field(field: Option<&str>, name: &str, payload: &str) -> Result<f64> {
    let raw = field.ok_or_else(|| Error::Payload(format!("missing {} in {:?}", name, payload)))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| Error::Payload(format!("{} {:?} is not a number", name, raw)))?;
    if !value.is_finite() {
        return Err(Error::Payload(format!("{} {:?} is not finite", name, raw)));
    }
    Ok(value)
}

/// Returns the temperature field exactly as it was written by the producer.
pub fn temperature_field(payload: &str) -> Option<&str> {
    payload.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_two_decimals() {
        assert_eq!(Reading::new(9.0, 50.0).encode(), "9.00 50.00");
        assert_eq!(Reading::new(-18.456, 0.004).encode(), "-18.46 0.00");
    }

    #[test]
    fn test_parse_positional_fields() {
        let reading: Reading = "5.00 3.00".parse().unwrap();
        assert_eq!(reading, Reading::new(5.0, 3.0));

        let padded: Reading = "  7.5\t 99 ".parse().unwrap();
        assert_eq!(padded, Reading::new(7.5, 99.0));
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!("".parse::<Reading>().is_err());
        assert!("4.00".parse::<Reading>().is_err());
        assert!("warm 50".parse::<Reading>().is_err());
        assert!("NaN 50".parse::<Reading>().is_err());
    }

    #[test]
    fn test_temperature_field_is_verbatim() {
        assert_eq!(temperature_field("4.10 88.20"), Some("4.10"));
        assert_eq!(temperature_field("   "), None);
    }
}
