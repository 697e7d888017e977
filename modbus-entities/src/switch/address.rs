//! Bit-address tokens (`%MX401.5`) and the register/bit pairs derived from them.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

static BIT_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%([A-Z]+)(\d+)\.(\d+)$").expect("valid bit address pattern"));

/// Area class whose status registers live 200 words further.
const OUTPUT_AREA: &str = "QX";
const OUTPUT_AREA_OFFSET: u32 = 200;

/// A parsed `%<area><index>.<bit>` token, numbers kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitAddress {
    area: String,
    index: u32,
    bit: u8,
}

impl BitAddress {
    /// Parse `token` on behalf of entity `name`.
    pub fn parse(name: &str, token: &str) -> Result<Self, ConfigError> {
        let caps = BIT_ADDRESS
            .captures(token.trim())
            .ok_or_else(|| ConfigError::Token {
                name: name.to_string(),
                token: token.to_string(),
            })?;

        let out_of_range = |reason: &str| ConfigError::TokenRange {
            name: name.to_string(),
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let index = caps[2]
            .parse::<u32>()
            .map_err(|_| out_of_range("register index too large"))?;
        let bit = caps[3]
            .parse::<u8>()
            .ok()
            .filter(|b| *b <= 15)
            .ok_or_else(|| out_of_range("bit must be between 0 and 15"))?;

        Ok(Self {
            area: caps[1].to_string(),
            index,
            bit,
        })
    }

    /// Area letters, without the leading `%`.
    pub fn area(&self) -> &str {
        &self.area
    }

    /// Register index as written.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Bit literal as written (0-15).
    pub fn bit(&self) -> u8 {
        self.bit
    }
}

impl fmt::Display for BitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}.{}", self.area, self.index, self.bit)
    }
}

/// Where and what to write to command a register switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommand {
    /// 0-based command register.
    pub register: u16,
    /// 1-based bit position.
    pub bit: u8,
}

impl SwitchCommand {
    /// Derive the command from a parsed token: register `index - 1`, bit `literal + 1`.
    pub fn from_address(name: &str, address: &BitAddress) -> Result<Self, ConfigError> {
        let register = address
            .index
            .checked_sub(1)
            .and_then(|r| u16::try_from(r).ok())
            .ok_or_else(|| ConfigError::TokenRange {
                name: name.to_string(),
                token: address.to_string(),
                reason: "command register index must be between 1 and 65536".to_string(),
            })?;

        Ok(Self {
            register,
            bit: address.bit + 1,
        })
    }

    /// Word written to the command register.
    pub fn value(&self) -> u16 {
        1 << (self.bit - 1)
    }
}

/// Where to read a register switch's status and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchState {
    /// Status register, `index` (+200 for the `QX` area).
    pub register: u16,
    /// 1-based bit position.
    pub bit: u8,
    pub mask: u16,
    pub on: u16,
    pub off: u16,
}

impl SwitchState {
    pub fn from_address(name: &str, address: &BitAddress) -> Result<Self, ConfigError> {
        let offset = if address.area == OUTPUT_AREA {
            OUTPUT_AREA_OFFSET
        } else {
            0
        };

        let register = address
            .index
            .checked_add(offset)
            .and_then(|r| u16::try_from(r).ok())
            .ok_or_else(|| ConfigError::TokenRange {
                name: name.to_string(),
                token: address.to_string(),
                reason: "status register above 65535".to_string(),
            })?;

        let bit = address.bit + 1;
        let mask = 1 << (bit - 1);

        Ok(Self {
            register,
            bit,
            mask,
            on: mask,
            off: 0,
        })
    }

    /// Compare whole status words instead of a single bit.
    ///
    /// Unset patterns keep their defaults.
    pub fn with_patterns(mut self, on: Option<u16>, off: Option<u16>) -> Self {
        if on.is_none() && off.is_none() {
            return self;
        }
        self.mask = u16::MAX;
        if let Some(on) = on {
            self.on = on;
        }
        if let Some(off) = off {
            self.off = off;
        }
        self
    }

    /// Map a raw status word to on/off, `None` when it matches neither pattern.
    pub fn classify(&self, raw: u16) -> Option<bool> {
        let value = raw & self.mask;
        if value == self.on {
            Some(true)
        } else if value == self.off {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token() {
        let addr = BitAddress::parse("pump", "%MX401.5").unwrap();
        assert_eq!(addr.area(), "MX");
        assert_eq!(addr.index(), 401);
        assert_eq!(addr.bit(), 5);
        assert_eq!(addr.to_string(), "%MX401.5");
    }

    #[test]
    fn test_command_offsets() {
        let addr = BitAddress::parse("pump", "%MX401.5").unwrap();
        let cmd = SwitchCommand::from_address("pump", &addr).unwrap();
        assert_eq!(cmd.register, 400);
        assert_eq!(cmd.bit, 6);
        assert_eq!(cmd.value(), 32);
    }

    #[test]
    fn test_status_offsets() {
        let addr = BitAddress::parse("pump", "%QX4.7").unwrap();
        let state = SwitchState::from_address("pump", &addr).unwrap();
        assert_eq!(state.register, 204);
        assert_eq!(state.bit, 8);
        assert_eq!(state.mask, 128);
        assert_eq!(state.on, 128);
        assert_eq!(state.off, 0);

        let addr = BitAddress::parse("pump", "%MX4.7").unwrap();
        let state = SwitchState::from_address("pump", &addr).unwrap();
        assert_eq!(state.register, 4);
    }

    #[test]
    fn test_malformed_tokens() {
        for token in ["%MX40", "MX40.1", "%mx40.1", "%40.1", "%MX40.", "%MX4.0.1", ""] {
            assert!(
                matches!(
                    BitAddress::parse("pump", token),
                    Err(ConfigError::Token { .. })
                ),
                "{token} should be rejected"
            );
        }
    }

    #[test]
    fn test_out_of_range_tokens() {
        assert!(matches!(
            BitAddress::parse("pump", "%MX1.16"),
            Err(ConfigError::TokenRange { .. })
        ));

        let zero = BitAddress::parse("pump", "%MX0.1").unwrap();
        assert!(matches!(
            SwitchCommand::from_address("pump", &zero),
            Err(ConfigError::TokenRange { .. })
        ));
        // 0 is a valid status register
        assert!(SwitchState::from_address("pump", &zero).is_ok());

        let high = BitAddress::parse("pump", "%QX65400.0").unwrap();
        assert!(matches!(
            SwitchState::from_address("pump", &high),
            Err(ConfigError::TokenRange { .. })
        ));
    }

    #[test]
    fn test_highest_bit() {
        let addr = BitAddress::parse("pump", "%MX1.15").unwrap();
        let cmd = SwitchCommand::from_address("pump", &addr).unwrap();
        assert_eq!(cmd.value(), 0x8000);
    }

    #[test]
    fn test_classify_masked() {
        let addr = BitAddress::parse("pump", "%MX10.2").unwrap();
        let state = SwitchState::from_address("pump", &addr).unwrap();
        assert_eq!(state.classify(0b100), Some(true));
        assert_eq!(state.classify(0b111), Some(true));
        assert_eq!(state.classify(0), Some(false));
        assert_eq!(state.classify(0b011), Some(false));
    }

    #[test]
    fn test_classify_patterns() {
        let addr = BitAddress::parse("pump", "%MX10.0").unwrap();
        let state = SwitchState::from_address("pump", &addr)
            .unwrap()
            .with_patterns(Some(2), None);
        assert_eq!(state.mask, 0xFFFF);
        assert_eq!(state.classify(2), Some(true));
        assert_eq!(state.classify(0), Some(false));
        assert_eq!(state.classify(3), None);
    }
}
