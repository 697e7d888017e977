//! Register words to typed values.
//!
//! Words are packed big-endian (after an optional word reversal) and then
//! either read as a single bit, decoded as text, or unpacked through the
//! spec's [`Structure`] and scaled.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DecodeError};
use crate::structure::Structure;
use crate::transport::RegisterKind;
use crate::value::{DecodedValue, Number, Scalar};

/// How the packed register bytes are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed integer sized by the word count (default).
    #[default]
    Int,
    /// Unsigned integer sized by the word count.
    Uint,
    /// IEEE float sized by the word count.
    Float,
    /// UTF-8 text.
    String,
    /// User supplied structure.
    Custom,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Uint => "uint",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Custom => "custom",
        }
    }

    /// Default structure for this type spread over `count` words.
    ///
    /// `None` when no single scalar of this type spans `count` words, and
    /// always for [`DataType::Custom`].
    pub fn default_structure(&self, count: u16) -> Option<String> {
        let code = match (self, count) {
            (DataType::String, n) => return Some(format!(">{}s", usize::from(n) * 2)),
            (DataType::Int, 1) => 'h',
            (DataType::Int, 2) => 'i',
            (DataType::Int, 4) => 'q',
            (DataType::Uint, 1) => 'H',
            (DataType::Uint, 2) => 'I',
            (DataType::Uint, 4) => 'Q',
            (DataType::Float, 1) => 'e',
            (DataType::Float, 2) => 'f',
            (DataType::Float, 4) => 'd',
            _ => return None,
        };
        Some(format!(">{}", code))
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated register mapping.
///
/// Built through [`RegisterSpecBuilder`], which guarantees the structure
/// spans exactly `count * 2` bytes and the bit index lies inside them.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    name: String,
    address: u16,
    count: u16,
    kind: RegisterKind,
    reverse_order: bool,
    data_type: DataType,
    structure: Structure,
    bit: Option<u16>,
    scale: Number,
    offset: Number,
    precision: u32,
}

impl RegisterSpec {
    /// Start building a spec for a value at `address`.
    pub fn builder(name: impl Into<String>, address: u16) -> RegisterSpecBuilder {
        RegisterSpecBuilder::new(name, address)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn reverse_order(&self) -> bool {
        self.reverse_order
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn bit(&self) -> Option<u16> {
        self.bit
    }

    pub fn scale(&self) -> Number {
        self.scale
    }

    pub fn offset(&self) -> Number {
        self.offset
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }
}

/// Builder for [`RegisterSpec`].
#[derive(Debug, Clone)]
pub struct RegisterSpecBuilder {
    name: String,
    address: u16,
    count: u16,
    kind: RegisterKind,
    reverse_order: bool,
    data_type: DataType,
    structure: Option<String>,
    bit: Option<u16>,
    scale: Number,
    offset: Number,
    precision: u32,
}

impl RegisterSpecBuilder {
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Self {
            name: name.into(),
            address,
            count: 1,
            kind: RegisterKind::Holding,
            reverse_order: false,
            data_type: DataType::Int,
            structure: None,
            bit: None,
            scale: Number::Int(1),
            offset: Number::Int(0),
            precision: 0,
        }
    }

    /// Number of 16-bit words to read.
    pub fn count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn kind(mut self, kind: RegisterKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reverse the word order before packing.
    pub fn reverse_order(mut self, reverse: bool) -> Self {
        self.reverse_order = reverse;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Structure descriptor, used by [`DataType::Custom`].
    pub fn structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    /// Bit index counted from the least significant bit, starting at 1.
    ///
    /// `0` means no bit extraction.
    pub fn bit(mut self, bit: Option<u16>) -> Self {
        self.bit = bit.filter(|b| *b != 0);
        self
    }

    pub fn scale(mut self, scale: impl Into<Number>) -> Self {
        self.scale = scale.into();
        self
    }

    pub fn offset(mut self, offset: impl Into<Number>) -> Self {
        self.offset = offset.into();
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Validate and build the spec.
    pub fn build(self) -> Result<RegisterSpec, ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::validation(format!(
                "'{}': count must be at least 1",
                self.name
            )));
        }

        let source = match self.data_type {
            DataType::Custom => self.structure.clone().ok_or_else(|| ConfigError::Structure {
                name: self.name.clone(),
                reason: "custom data type requires a structure".to_string(),
            })?,
            other => other
                .default_structure(self.count)
                .ok_or_else(|| ConfigError::UnsupportedCount {
                    name: self.name.clone(),
                    data_type: other.to_string(),
                    count: self.count,
                })?,
        };

        let structure = Structure::parse(&source).map_err(|reason| ConfigError::Structure {
            name: self.name.clone(),
            reason,
        })?;

        if structure.size() != usize::from(self.count) * 2 {
            return Err(ConfigError::SizeMismatch {
                name: self.name,
                size: structure.size(),
                count: self.count,
            });
        }

        let bits = usize::from(self.count) * 16;
        if let Some(bit) = self.bit {
            if usize::from(bit) > bits {
                return Err(ConfigError::BitIndex {
                    name: self.name,
                    bit,
                    bits,
                });
            }
        }

        Ok(RegisterSpec {
            name: self.name,
            address: self.address,
            count: self.count,
            kind: self.kind,
            reverse_order: self.reverse_order,
            data_type: self.data_type,
            structure,
            bit: self.bit,
            scale: self.scale,
            offset: self.offset,
            precision: self.precision,
        })
    }
}

/// Pack words big-endian, optionally reversing their order first.
pub fn pack_words(words: &[u16], reverse: bool) -> Vec<u8> {
    let mut words = words.to_vec();
    if reverse {
        words.reverse();
    }
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Bit `bit` (1 = least significant) of a big-endian byte string.
fn bit_at(bytes: &[u8], bit: u16) -> bool {
    let position = bytes.len() * 8 - usize::from(bit);
    (bytes[position / 8] >> (7 - position % 8)) & 1 == 1
}

/// Decode register words according to `spec`.
pub fn decode(words: &[u16], spec: &RegisterSpec) -> Result<DecodedValue, DecodeError> {
    if words.len() != usize::from(spec.count) {
        return Err(DecodeError::WordCount {
            expected: usize::from(spec.count),
            got: words.len(),
        });
    }

    let bytes = pack_words(words, spec.reverse_order);

    if let Some(bit) = spec.bit {
        return Ok(DecodedValue::Bit(bit_at(&bytes, bit)));
    }

    if spec.data_type == DataType::String {
        let text = std::str::from_utf8(&bytes)?;
        return Ok(DecodedValue::Text(text.to_string()));
    }

    let mut values = spec
        .structure
        .unpack(&bytes)
        .ok_or(DecodeError::WordCount {
            expected: spec.structure.size() / 2,
            got: words.len(),
        })?;

    if values.len() != 1 {
        return Ok(DecodedValue::Tuple(values));
    }

    let value = values.remove(0);
    Ok(match value.numeric() {
        Some(n) => DecodedValue::Number {
            value: n.linear(spec.scale, spec.offset),
            precision: spec.precision,
        },
        // Byte strings are passed through untouched.
        None => DecodedValue::Text(value.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Numeric;

    fn int_spec(count: u16) -> RegisterSpecBuilder {
        RegisterSpec::builder("test", 0).count(count)
    }

    #[test]
    fn test_default_structures() {
        assert_eq!(DataType::Int.default_structure(1).as_deref(), Some(">h"));
        assert_eq!(DataType::Uint.default_structure(2).as_deref(), Some(">I"));
        assert_eq!(DataType::Float.default_structure(4).as_deref(), Some(">d"));
        assert_eq!(DataType::String.default_structure(3).as_deref(), Some(">6s"));
        assert_eq!(DataType::Int.default_structure(3), None);
        assert_eq!(DataType::Custom.default_structure(1), None);
    }

    #[test]
    fn test_integer_scale_offset() {
        let spec = int_spec(1).scale(2).offset(5).build().unwrap();
        let value = decode(&[100], &spec).unwrap();
        assert_eq!(
            value,
            DecodedValue::Number {
                value: Numeric::Int(205),
                precision: 0
            }
        );
        assert_eq!(value.to_string(), "205");
    }

    #[test]
    fn test_integer_with_precision() {
        let spec = int_spec(1).scale(2).offset(5).precision(1).build().unwrap();
        assert_eq!(decode(&[100], &spec).unwrap().to_string(), "205.0");
    }

    #[test]
    fn test_signed_and_unsigned() {
        let spec = int_spec(1).build().unwrap();
        assert_eq!(decode(&[0xffff], &spec).unwrap().to_string(), "-1");

        let spec = int_spec(1).data_type(DataType::Uint).build().unwrap();
        assert_eq!(decode(&[0xffff], &spec).unwrap().to_string(), "65535");

        let spec = int_spec(2).data_type(DataType::Uint).build().unwrap();
        assert_eq!(decode(&[0x0001, 0x0000], &spec).unwrap().to_string(), "65536");
    }

    #[test]
    fn test_float_scale() {
        let spec = int_spec(1).scale(0.1).precision(1).build().unwrap();
        assert_eq!(decode(&[225], &spec).unwrap().to_string(), "22.5");
    }

    #[test]
    fn test_float_layout() {
        // 0x00410042 is a subnormal float
        let spec = int_spec(2)
            .data_type(DataType::Float)
            .precision(2)
            .build()
            .unwrap();
        assert_eq!(decode(&[0x0041, 0x0042], &spec).unwrap().to_string(), "0.00");

        // 123.456
        let spec = int_spec(2)
            .data_type(DataType::Float)
            .precision(3)
            .build()
            .unwrap();
        assert_eq!(decode(&[0x42f6, 0xe979], &spec).unwrap().to_string(), "123.456");
    }

    #[test]
    fn test_string_ignores_scale() {
        let spec = int_spec(2)
            .data_type(DataType::String)
            .scale(10)
            .offset(3)
            .precision(2)
            .build()
            .unwrap();
        let value = decode(&[0x4142, 0x4344], &spec).unwrap();
        assert_eq!(value, DecodedValue::Text("ABCD".to_string()));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let spec = int_spec(1).data_type(DataType::String).build().unwrap();
        assert!(matches!(decode(&[0xff41], &spec), Err(DecodeError::Text(_))));
    }

    #[test]
    fn test_bit_extraction() {
        let lsb = int_spec(1).bit(Some(1)).build().unwrap();
        let msb = int_spec(1).bit(Some(16)).build().unwrap();
        let third = int_spec(1).bit(Some(3)).build().unwrap();

        assert_eq!(decode(&[0b101], &lsb).unwrap().to_string(), "1");
        assert_eq!(decode(&[0b101], &msb).unwrap().to_string(), "0");
        assert_eq!(decode(&[0b101], &third).unwrap().to_string(), "1");
        assert_eq!(decode(&[0x8000], &msb).unwrap(), DecodedValue::Bit(true));
    }

    #[test]
    fn test_bit_bypasses_scale() {
        let spec = int_spec(1)
            .bit(Some(1))
            .scale(100)
            .precision(2)
            .build()
            .unwrap();
        assert_eq!(decode(&[1], &spec).unwrap().to_string(), "1");
    }

    #[test]
    fn test_bit_zero_is_disabled() {
        let spec = int_spec(1).bit(Some(0)).build().unwrap();
        assert_eq!(spec.bit(), None);
        assert_eq!(decode(&[5], &spec).unwrap().to_string(), "5");
    }

    #[test]
    fn test_bit_out_of_range() {
        let err = int_spec(1).bit(Some(17)).build().unwrap_err();
        assert!(matches!(err, ConfigError::BitIndex { bit: 17, bits: 16, .. }));
    }

    #[test]
    fn test_reverse_order() {
        let reversed = int_spec(2)
            .data_type(DataType::Uint)
            .reverse_order(true)
            .build()
            .unwrap();
        let straight = int_spec(2).data_type(DataType::Uint).build().unwrap();

        assert_eq!(
            decode(&[0x1234, 0x5678], &reversed).unwrap(),
            decode(&[0x5678, 0x1234], &straight).unwrap()
        );
        assert_eq!(decode(&[0x0001, 0x0000], &reversed).unwrap().to_string(), "1");
    }

    #[test]
    fn test_custom_multi_field_is_unscaled() {
        let spec = int_spec(2)
            .data_type(DataType::Custom)
            .structure(">2h")
            .scale(10)
            .offset(1)
            .precision(2)
            .build()
            .unwrap();
        let value = decode(&[7, 0xfffe], &spec).unwrap();
        assert_eq!(value, DecodedValue::Tuple(vec![Scalar::Int(7), Scalar::Int(-2)]));
        assert_eq!(value.to_string(), "7,-2");
    }

    #[test]
    fn test_custom_single_field_is_scaled() {
        let spec = int_spec(2)
            .data_type(DataType::Custom)
            .structure(">xxh")
            .scale(3)
            .build()
            .unwrap();
        assert_eq!(decode(&[0xffff, 4], &spec).unwrap().to_string(), "12");
    }

    #[test]
    fn test_custom_requires_structure() {
        let err = int_spec(1).data_type(DataType::Custom).build().unwrap_err();
        assert!(matches!(err, ConfigError::Structure { .. }));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = int_spec(1)
            .data_type(DataType::Custom)
            .structure(">i")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::SizeMismatch { size: 4, count: 1, .. }));
    }

    #[test]
    fn test_unsupported_count_rejected() {
        let err = int_spec(3).build().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedCount { count: 3, .. }));
    }

    #[test]
    fn test_word_count_mismatch() {
        let spec = int_spec(2).data_type(DataType::Uint).build().unwrap();
        assert_eq!(
            decode(&[1], &spec),
            Err(DecodeError::WordCount {
                expected: 2,
                got: 1
            })
        );
    }
}
