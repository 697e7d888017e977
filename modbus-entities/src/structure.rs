//! Structure descriptors in the conventional packing notation.
//!
//! A descriptor is an optional byte order prefix followed by `[count]code`
//! items, for example `>f`, `>2h`, `<I` or `>4sH`.
//!
//! | Code | Value | Bytes |
//! |------|-------|-------|
//! | `x` | pad, no value | 1 |
//! | `c` | char | 1 |
//! | `b` / `B` | i8 / u8 | 1 |
//! | `?` | bool | 1 |
//! | `h` / `H` | i16 / u16 | 2 |
//! | `i` `l` / `I` `L` | i32 / u32 | 4 |
//! | `q` / `Q` | i64 / u64 | 8 |
//! | `e` | f16 | 2 |
//! | `f` | f32 | 4 |
//! | `d` | f64 | 8 |
//! | `s` | byte string of `count` bytes | count |
//!
//! `>` and `!` select big-endian, `<` little-endian. `=`, `@` or no prefix
//! fall back to big-endian, the order registers arrive in.

use std::fmt;
use std::str::FromStr;

use crate::value::Scalar;

/// Byte order used to unpack multi-byte fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// One field of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pad,
    Char,
    I8,
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
    Bytes(usize),
}

impl Field {
    /// Size of the field in bytes.
    pub fn size(&self) -> usize {
        match self {
            Field::Pad | Field::Char | Field::I8 | Field::U8 | Field::Bool => 1,
            Field::I16 | Field::U16 | Field::F16 => 2,
            Field::I32 | Field::U32 | Field::F32 => 4,
            Field::I64 | Field::U64 | Field::F64 => 8,
            Field::Bytes(n) => *n,
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'x' => Field::Pad,
            'c' => Field::Char,
            'b' => Field::I8,
            'B' => Field::U8,
            '?' => Field::Bool,
            'h' => Field::I16,
            'H' => Field::U16,
            'i' | 'l' => Field::I32,
            'I' | 'L' => Field::U32,
            'q' => Field::I64,
            'Q' => Field::U64,
            'e' => Field::F16,
            'f' => Field::F32,
            'd' => Field::F64,
            _ => return None,
        })
    }
}

/// A parsed structure descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    source: String,
    order: ByteOrder,
    fields: Vec<Field>,
}

impl Structure {
    /// Parse a descriptor, reporting the reason it is malformed.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut chars = source.trim().chars().peekable();

        let order = match chars.peek() {
            Some('>') | Some('!') | Some('=') | Some('@') => {
                chars.next();
                ByteOrder::Big
            }
            Some('<') => {
                chars.next();
                ByteOrder::Little
            }
            _ => ByteOrder::Big,
        };

        let mut fields = Vec::new();
        let mut count: Option<usize> = None;

        for c in chars {
            if c.is_whitespace() {
                if count.is_some() {
                    return Err(format!("repeat count without format in '{}'", source));
                }
                continue;
            }

            if let Some(digit) = c.to_digit(10) {
                let n = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit as usize))
                    .ok_or_else(|| format!("repeat count too large in '{}'", source))?;
                count = Some(n);
                continue;
            }

            let repeat = count.take().unwrap_or(1);
            if c == 's' {
                fields.push(Field::Bytes(repeat));
                continue;
            }

            let field = Field::from_code(c)
                .ok_or_else(|| format!("bad char '{}' in struct format '{}'", c, source))?;
            fields.extend(std::iter::repeat_n(field, repeat));
        }

        if count.is_some() {
            return Err(format!("repeat count given without format specifier in '{}'", source));
        }

        Ok(Self {
            source: source.to_string(),
            order,
            fields,
        })
    }

    /// The descriptor this structure was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Total packed size in bytes.
    pub fn size(&self) -> usize {
        self.fields.iter().map(Field::size).sum()
    }

    /// Unpack `bytes` into values. Pad fields yield nothing.
    ///
    /// Returns `None` if `bytes` is not exactly [`size`](Self::size) long.
    pub fn unpack(&self, bytes: &[u8]) -> Option<Vec<Scalar>> {
        if bytes.len() != self.size() {
            return None;
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut pos = 0;

        for field in &self.fields {
            let raw = &bytes[pos..pos + field.size()];
            pos += field.size();

            let value = match field {
                Field::Pad => continue,
                Field::Char => Scalar::Bytes(raw.to_vec()),
                Field::Bytes(_) => Scalar::Bytes(raw.to_vec()),
                Field::I8 => Scalar::Int(i128::from(raw[0] as i8)),
                Field::U8 => Scalar::Int(i128::from(raw[0])),
                Field::Bool => Scalar::Bool(raw[0] != 0),
                Field::I16 => Scalar::Int(i128::from(i16::from_be_bytes(self.ordered(raw)))),
                Field::U16 => Scalar::Int(i128::from(u16::from_be_bytes(self.ordered(raw)))),
                Field::I32 => Scalar::Int(i128::from(i32::from_be_bytes(self.ordered(raw)))),
                Field::U32 => Scalar::Int(i128::from(u32::from_be_bytes(self.ordered(raw)))),
                Field::I64 => Scalar::Int(i128::from(i64::from_be_bytes(self.ordered(raw)))),
                Field::U64 => Scalar::Int(i128::from(u64::from_be_bytes(self.ordered(raw)))),
                Field::F16 => Scalar::Float(f16_to_f64(u16::from_be_bytes(self.ordered(raw)))),
                Field::F32 => {
                    Scalar::Float(f64::from(f32::from_be_bytes(self.ordered(raw))))
                }
                Field::F64 => Scalar::Float(f64::from_be_bytes(self.ordered(raw))),
            };
            values.push(value);
        }

        Some(values)
    }

    /// Copy `raw` into a big-endian array, flipping little-endian input.
    fn ordered<const N: usize>(&self, raw: &[u8]) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(raw);
        if self.order == ByteOrder::Little {
            buf.reverse();
        }
        buf
    }
}

impl FromStr for Structure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// IEEE 754 half precision to double.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let fraction = f64::from(bits & 0x03ff);

    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1f if fraction == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}
