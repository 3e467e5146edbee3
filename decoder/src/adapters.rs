//! Little-endian byte windows and the semantic values they carry.
//!
//! Every adapter here has an alignment of one, so the `#[repr(C)]` layouts in
//! [`crate::state`] built from them have no implicit padding and can be cast
//! straight out of an unaligned account buffer.
use bytemuck::{Pod, Zeroable};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

/// Maximum number of decimal places kept when decoding an [`I80F48`].
pub const I80F48_DECIMAL_PLACES: u32 = 20;

const I80F48_FRACTIONAL_BITS: u32 = 48;
// the integer part spans [-2^79, 2^79)
const I80F48_INTEGER_BITS_MAGNITUDE: u32 = 127 - I80F48_FRACTIONAL_BITS;
// rust_decimal holds at most 28 significant digits
const MAX_SIGNIFICANT_DIGITS: u32 = 28;

macro_rules! le_integer {
    ($(#[$doc:meta])* $name:ident, $native:ty, $width:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name([u8; $width]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $width;

            /// Store `value` in little-endian order.
            pub fn new(value: $native) -> Self {
                Self(value.to_le_bytes())
            }

            /// The native value.
            pub fn get(self) -> $native {
                <$native>::from_le_bytes(self.0)
            }
        }

        impl From<$native> for $name {
            fn from(value: $native) -> Self {
                Self::new(value)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.get())
            }
        }
    };
}

le_integer!(
    /// Unsigned 32-bit little-endian integer
    LeU32, u32, 4
);
le_integer!(
    /// Unsigned 64-bit little-endian integer
    LeU64, u64, 8
);
le_integer!(
    /// Signed 64-bit little-endian integer
    LeI64, i64, 8
);
le_integer!(
    /// Unsigned 128-bit little-endian integer
    LeU128, u128, 16
);
le_integer!(
    /// Signed 128-bit little-endian integer
    LeI128, i128, 16
);

/// A one byte boolean. Any non-zero value reads as `true`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Debug)]
#[repr(transparent)]
pub struct Flag(u8);

impl Flag {
    /// Store `value` as `0` or `1`.
    pub fn new(value: bool) -> Self {
        Self(value as u8)
    }

    #[allow(missing_docs)]
    pub fn get(self) -> bool {
        self.0 != 0
    }
}

/// Signed 128-bit fixed point number with 48 fractional bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct I80F48([u8; 16]);

impl I80F48 {
    /// Width in bytes.
    pub const LEN: usize = 16;
    /// Largest representable value.
    pub const MAX: Self = Self(i128::MAX.to_le_bytes());
    /// Smallest representable value, -2^79.
    pub const MIN: Self = Self(i128::MIN.to_le_bytes());

    /// The number whose raw representation is `bits`, i.e. `bits / 2^48`.
    pub fn from_bits(bits: i128) -> Self {
        Self(bits.to_le_bytes())
    }

    /// The raw representation.
    pub fn to_bits(self) -> i128 {
        i128::from_le_bytes(self.0)
    }

    /// Exact value divided by 2^48, rounded to at most [`I80F48_DECIMAL_PLACES`] places.
    pub fn to_decimal(self) -> Decimal {
        let bits = self.to_bits();
        // Arithmetic shift floors, so the fractional remainder is always positive.
        let integer = bits >> I80F48_FRACTIONAL_BITS;
        let fraction = (bits & ((1i128 << I80F48_FRACTIONAL_BITS) - 1)) as u64;
        // |integer| < 2^79 always fits the 96-bit mantissa
        let integer = Decimal::from_i128_with_scale(integer, 0);
        if fraction == 0 {
            return integer;
        }
        let fraction = Decimal::from(fraction) / Decimal::from(1u64 << I80F48_FRACTIONAL_BITS);
        let places = I80F48_DECIMAL_PLACES
            .min(MAX_SIGNIFICANT_DIGITS.saturating_sub(integer_digits(integer)));
        integer + fraction.round_dp(places)
    }

    /// Inverse of [`I80F48::to_decimal`], rounding to the nearest representable value.
    /// Values outside the 80-bit integer range saturate to [`I80F48::MIN`] or
    /// [`I80F48::MAX`].
    pub fn from_decimal(value: Decimal) -> Self {
        let integer = value.floor();
        let fraction = value - integer;
        let integer_bits = integer.mantissa() / 10i128.pow(integer.scale());
        if integer_bits >= 1i128 << I80F48_INTEGER_BITS_MAGNITUDE {
            return Self::MAX;
        }
        if integer_bits < -(1i128 << I80F48_INTEGER_BITS_MAGNITUDE) {
            return Self::MIN;
        }
        let fraction_bits = (fraction * Decimal::from(1u64 << I80F48_FRACTIONAL_BITS))
            .round()
            .mantissa();
        Self::from_bits((integer_bits << I80F48_FRACTIONAL_BITS).saturating_add(fraction_bits))
    }
}

impl std::fmt::Debug for I80F48 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

fn integer_digits(value: Decimal) -> u32 {
    let mut magnitude = value.mantissa().unsigned_abs();
    let mut digits = 0;
    while magnitude > 0 {
        magnitude /= 10;
        digits += 1;
    }
    digits
}

/// Reads an unsigned little-endian integer of 8 or 16 bytes and divides it by
/// 2^(bits / 2): an FP32 value for 8 bytes, an FP64 value for 16 bytes.
///
/// The caller hands over exactly the field window; wider windows are not a
/// fixed point format this protocol uses.
pub fn fixed_point_to_decimal(bytes: &[u8]) -> Decimal {
    debug_assert!(bytes.len() == 8 || bytes.len() == 16);
    let mut buf = [0u8; 16];
    buf[..bytes.len()].copy_from_slice(bytes);
    let raw = u128::from_le_bytes(buf);
    let fractional_bits = (bytes.len() * 8 / 2) as u32;
    let integer = raw >> fractional_bits;
    let fraction = raw & ((1u128 << fractional_bits) - 1);
    let integer = Decimal::from_i128_with_scale(integer as i128, 0);
    if fraction == 0 {
        return integer;
    }
    // The divisor goes in as two halves so 2^64 never has to be a single literal.
    let half = Decimal::from(1u64 << (fractional_bits / 2));
    let fraction = Decimal::from_i128_with_scale(fraction as i128, 0) / half / half;
    let places = I80F48_DECIMAL_PLACES
        .min(MAX_SIGNIFICANT_DIGITS.saturating_sub(integer_digits(integer)));
    integer + fraction.round_dp(places)
}

/// Inverse of [`fixed_point_to_decimal`], writing `width` bytes (8 or 16).
/// Negative inputs encode as zero; inputs beyond the largest representable
/// value saturate to all ones.
pub fn decimal_to_fixed_point(value: Decimal, width: usize) -> Vec<u8> {
    debug_assert!(width == 8 || width == 16);
    let fractional_bits = (width * 8 / 2) as u32;
    let max_raw = u128::MAX >> (128 - width * 8);
    let value = value.max(Decimal::ZERO);
    let integer = value.floor();
    let fraction = value - integer;
    let integer_raw = (integer.mantissa() / 10i128.pow(integer.scale())) as u128;
    let raw = if integer_raw >> fractional_bits != 0 {
        max_raw
    } else {
        let half = Decimal::from(1u64 << (fractional_bits / 2));
        let fraction_raw = (fraction * half * half).round().mantissa() as u128;
        (integer_raw << fractional_bits)
            .saturating_add(fraction_raw)
            .min(max_raw)
    };
    raw.to_le_bytes()[..width].to_vec()
}

/// Maps the canonical all-zero key to `None`.
pub fn optional_pubkey(key: Pubkey) -> Option<Pubkey> {
    if key == Pubkey::default() {
        None
    } else {
        Some(key)
    }
}

/// Inverse of [`optional_pubkey`].
pub fn pubkey_or_default(key: Option<Pubkey>) -> Pubkey {
    key.unwrap_or_default()
}

/// Seconds since the Unix epoch, stored as an unsigned little-endian u64.
/// Ordered by time.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct UnixTimestamp([u8; 8]);

impl UnixTimestamp {
    #[allow(missing_docs)]
    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds.to_le_bytes())
    }

    /// Seconds since the Unix epoch.
    pub fn seconds(self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// `None` only for values beyond what `chrono` can represent.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let seconds = i64::try_from(self.seconds()).ok()?;
        DateTime::from_timestamp(seconds, 0)
    }
}

impl Ord for UnixTimestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seconds().cmp(&other.seconds())
    }
}

impl PartialOrd for UnixTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Debug for UnixTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(datetime) => write!(f, "{}", datetime.to_rfc3339()),
            None => write!(f, "{}s", self.seconds()),
        }
    }
}

/// The packed 16-byte order key: sequence number in the low 8 bytes, price in
/// the high 8 bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct OrderKey([u8; 16]);

impl OrderKey {
    /// Pack a price in lots with the sequence number that ranks orders at that price.
    ///
    /// ```
    /// use mango_decoder::adapters::OrderKey;
    ///
    /// let key = OrderKey::new(250, 7);
    /// assert_eq!((key.price(), key.sequence()), (250, 7));
    /// assert_eq!(key.as_u128(), (250u128 << 64) | 7);
    /// ```
    pub fn new(price: u64, sequence: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&sequence.to_le_bytes());
        bytes[8..].copy_from_slice(&price.to_le_bytes());
        Self(bytes)
    }

    /// The key as the protocol passes it in instructions and events.
    pub fn from_u128(key: u128) -> Self {
        Self(key.to_le_bytes())
    }

    /// Inverse of [`OrderKey::from_u128`].
    pub fn as_u128(self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    /// Price in lots, the high 8 bytes.
    pub fn price(self) -> u64 {
        let mut price = [0u8; 8];
        price.copy_from_slice(&self.0[8..]);
        u64::from_le_bytes(price)
    }

    /// Sequence number, the low 8 bytes.
    pub fn sequence(self) -> u64 {
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(sequence)
    }
}

impl std::fmt::Debug for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderKey")
            .field("price", &self.price())
            .field("sequence", &self.sequence())
            .finish()
    }
}
