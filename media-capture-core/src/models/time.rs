use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Exact rational timestamp: `value / timescale` seconds.
///
/// Plays the role of `CMTime`. All arithmetic is carried out on the
/// rationals themselves (common timescale via LCM, `i128` intermediates),
/// never through floating point, so long recordings do not drift.
/// Results are reduced to lowest terms.
///
/// Equality and ordering compare the represented instant, so
/// `TimeBase::new(1, 2) == TimeBase::new(30, 60)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawTimeBase")]
pub struct TimeBase {
    value: i64,
    timescale: u64,
}

#[derive(Deserialize)]
struct RawTimeBase {
    value: i64,
    timescale: u64,
}

impl TryFrom<RawTimeBase> for TimeBase {
    type Error = String;

    fn try_from(raw: RawTimeBase) -> Result<Self, Self::Error> {
        if raw.timescale == 0 {
            return Err("timescale must be non-zero".into());
        }
        Ok(TimeBase::new(raw.value, raw.timescale))
    }
}

impl TimeBase {
    pub const ZERO: TimeBase = TimeBase { value: 0, timescale: 1 };

    /// Create a timestamp of `value / timescale` seconds.
    ///
    /// # Panics
    /// Panics if `timescale` is zero.
    pub fn new(value: i64, timescale: u64) -> Self {
        assert!(timescale > 0, "timescale must be non-zero");
        Self { value, timescale }.reduced()
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { value: seconds, timescale: 1 }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1_000)
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self::new(nanos, 1_000_000_000)
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn timescale(&self) -> u64 {
        self.timescale
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0
    }

    /// Lossy conversion for reporting only. Never feed the result back
    /// into timestamp arithmetic.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Express this time in another timescale, truncating toward zero.
    pub fn rescale(&self, timescale: u64) -> Self {
        assert!(timescale > 0, "timescale must be non-zero");
        let value = self.value as i128 * timescale as i128 / self.timescale as i128;
        Self {
            value: clamp_i64(value),
            timescale,
        }
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let (a, b, scale) = common_scale(self, rhs);
        from_wide(a.checked_add(b)?, scale)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let (a, b, scale) = common_scale(self, rhs);
        from_wide(a.checked_sub(b)?, scale)
    }

    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    pub fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    fn reduced(self) -> Self {
        if self.value == 0 {
            return Self::ZERO;
        }
        let g = gcd(self.value.unsigned_abs() as u128, self.timescale as u128);
        Self {
            value: (self.value as i128 / g as i128) as i64,
            timescale: (self.timescale as u128 / g) as u64,
        }
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for TimeBase {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeBase {}

impl PartialOrd for TimeBase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeBase {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        lhs.cmp(&rhs)
    }
}

/// Saturates at the `i64` range rather than wrapping; use
/// [`TimeBase::checked_add`] where overflow must be detected.
impl Add for TimeBase {
    type Output = TimeBase;

    fn add(self, rhs: Self) -> Self::Output {
        let (a, b, scale) = common_scale(self, rhs);
        saturating_from_wide(a.saturating_add(b), scale, self.timescale.max(rhs.timescale))
    }
}

impl Sub for TimeBase {
    type Output = TimeBase;

    fn sub(self, rhs: Self) -> Self::Output {
        let (a, b, scale) = common_scale(self, rhs);
        saturating_from_wide(a.saturating_sub(b), scale, self.timescale.max(rhs.timescale))
    }
}

impl Neg for TimeBase {
    type Output = TimeBase;

    fn neg(self) -> Self::Output {
        Self {
            value: self.value.saturating_neg(),
            timescale: self.timescale,
        }
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.value, self.timescale)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// Bring both operands onto `lcm(a.timescale, b.timescale)`. The LCM of
/// two `u64` scales always fits in `u128` and each scaled value in `i128`.
fn common_scale(a: TimeBase, b: TimeBase) -> (i128, i128, u128) {
    let sa = a.timescale as u128;
    let sb = b.timescale as u128;
    let scale = sa / gcd(sa, sb) * sb;
    let va = a.value as i128 * (scale / sa) as i128;
    let vb = b.value as i128 * (scale / sb) as i128;
    (va, vb, scale)
}

fn reduce_wide(value: i128, scale: u128) -> (i128, u128) {
    if value == 0 {
        return (0, 1);
    }
    let g = gcd(value.unsigned_abs(), scale);
    (value / g as i128, scale / g)
}

fn from_wide(value: i128, scale: u128) -> Option<TimeBase> {
    let (value, scale) = reduce_wide(value, scale);
    let value = i64::try_from(value).ok()?;
    let timescale = u64::try_from(scale).ok()?;
    Some(TimeBase { value, timescale })
}

/// Exact whenever the reduced scale fits in `u64`, which holds for any
/// pair of operands whose timescales are themselves below 2^32. Beyond
/// that the result is truncated onto `fallback`, the larger operand scale.
fn saturating_from_wide(value: i128, scale: u128, fallback: u64) -> TimeBase {
    let (value, scale) = reduce_wide(value, scale);
    if let Ok(timescale) = u64::try_from(scale) {
        return TimeBase {
            value: clamp_i64(value),
            timescale,
        };
    }
    let value = match value.checked_mul(fallback as i128) {
        Some(wide) => wide / scale as i128,
        None => value / (scale / fallback as u128) as i128,
    };
    TimeBase {
        value: clamp_i64(value),
        timescale: fallback,
    }
    .reduced()
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
