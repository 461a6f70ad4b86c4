//! Dynamically typed field values.
//!
//! Every cell of a resultset decodes into one of nine variants. The borrowed
//! form ([`FieldView`]) points into the buffer that backs the row it came
//! from; the owned form ([`FieldValue`]) carries its own string storage.

/// Variant tag shared by [`FieldValue`] and [`FieldView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Null,
    Int,
    Uint,
    Bytes,
    Float,
    Double,
    Date,
    Datetime,
    Time,
}

/// A calendar date. Years 0-9999; a server may send the all-zero date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// A calendar date plus time of day with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datetime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

/// A signed duration, |hours| <= 838. The zero duration carries no sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub negative: bool,
    pub hours: u16,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

impl Time {
    /// Build a duration, dropping the sign when every component is zero.
    pub fn new(negative: bool, hours: u16, minutes: u8, seconds: u8, microseconds: u32) -> Self {
        let zero = hours == 0 && minutes == 0 && seconds == 0 && microseconds == 0;
        Self {
            negative: negative && !zero,
            hours,
            minutes,
            seconds,
            microseconds,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0 && self.microseconds == 0
    }
}

/// A non-owning field value. String payloads borrow from the buffer that
/// backs the row; the view is valid only as long as that buffer is.
#[derive(Debug, Clone, Copy)]
pub enum FieldView<'a> {
    Null,
    Int(i64),
    Uint(u64),
    Bytes(&'a [u8]),
    Float(f32),
    Double(f64),
    Date(Date),
    Datetime(Datetime),
    Time(Time),
}

/// An owning field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Int(i64),
    Uint(u64),
    Bytes(Vec<u8>),
    Float(f32),
    Double(f64),
    Date(Date),
    Datetime(Datetime),
    Time(Time),
}

impl<'a> FieldView<'a> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldView::Null => FieldKind::Null,
            FieldView::Int(_) => FieldKind::Int,
            FieldView::Uint(_) => FieldKind::Uint,
            FieldView::Bytes(_) => FieldKind::Bytes,
            FieldView::Float(_) => FieldKind::Float,
            FieldView::Double(_) => FieldKind::Double,
            FieldView::Date(_) => FieldKind::Date,
            FieldView::Datetime(_) => FieldKind::Datetime,
            FieldView::Time(_) => FieldKind::Time,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldView::Null)
    }

    /// Copy the string payload out of the backing buffer.
    pub fn to_owned(&self) -> FieldValue {
        match *self {
            FieldView::Null => FieldValue::Null,
            FieldView::Int(v) => FieldValue::Int(v),
            FieldView::Uint(v) => FieldValue::Uint(v),
            FieldView::Bytes(v) => FieldValue::Bytes(v.to_vec()),
            FieldView::Float(v) => FieldValue::Float(v),
            FieldView::Double(v) => FieldValue::Double(v),
            FieldView::Date(v) => FieldValue::Date(v),
            FieldView::Datetime(v) => FieldValue::Datetime(v),
            FieldView::Time(v) => FieldValue::Time(v),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldView::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            FieldView::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            FieldView::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The string payload, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            FieldView::Bytes(v) => simdutf8::basic::from_utf8(v).ok(),
            _ => None,
        }
    }
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        self.as_view().kind()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_view(&self) -> FieldView<'_> {
        match self {
            FieldValue::Null => FieldView::Null,
            FieldValue::Int(v) => FieldView::Int(*v),
            FieldValue::Uint(v) => FieldView::Uint(*v),
            FieldValue::Bytes(v) => FieldView::Bytes(v),
            FieldValue::Float(v) => FieldView::Float(*v),
            FieldValue::Double(v) => FieldView::Double(*v),
            FieldValue::Date(v) => FieldView::Date(*v),
            FieldValue::Datetime(v) => FieldView::Datetime(*v),
            FieldValue::Time(v) => FieldView::Time(*v),
        }
    }
}

// A signed and an unsigned integer compare equal only when both are
// non-negative and numerically equal. Any other variant pair is unequal.
fn eq_views(a: &FieldView<'_>, b: &FieldView<'_>) -> bool {
    match (a, b) {
        (FieldView::Null, FieldView::Null) => true,
        (FieldView::Int(x), FieldView::Int(y)) => x == y,
        (FieldView::Uint(x), FieldView::Uint(y)) => x == y,
        (FieldView::Int(x), FieldView::Uint(y)) | (FieldView::Uint(y), FieldView::Int(x)) => {
            *x >= 0 && *x as u64 == *y
        }
        (FieldView::Bytes(x), FieldView::Bytes(y)) => x == y,
        (FieldView::Float(x), FieldView::Float(y)) => x == y,
        (FieldView::Double(x), FieldView::Double(y)) => x == y,
        (FieldView::Date(x), FieldView::Date(y)) => x == y,
        (FieldView::Datetime(x), FieldView::Datetime(y)) => x == y,
        (FieldView::Time(x), FieldView::Time(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for FieldView<'_> {
    fn eq(&self, other: &Self) -> bool {
        eq_views(self, other)
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        eq_views(&self.as_view(), &other.as_view())
    }
}

impl PartialEq<FieldView<'_>> for FieldValue {
    fn eq(&self, other: &FieldView<'_>) -> bool {
        eq_views(&self.as_view(), other)
    }
}

impl PartialEq<FieldValue> for FieldView<'_> {
    fn eq(&self, other: &FieldValue) -> bool {
        eq_views(self, &other.as_view())
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),+ => $variant:ident as $target:ty) => {
        $(impl From<$ty> for FieldValue {
            fn from(v: $ty) -> Self {
                FieldValue::$variant(v as $target)
            }
        })+
    };
}

impl_from_int!(i8, i16, i32, i64 => Int as i64);
impl_from_int!(u8, u16, u32, u64 => Uint as u64);

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Bytes(v.into_bytes())
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<Date> for FieldValue {
    fn from(v: Date) -> Self {
        FieldValue::Date(v)
    }
}

impl From<Datetime> for FieldValue {
    fn from(v: Datetime) -> Self {
        FieldValue::Datetime(v)
    }
}

impl From<Time> for FieldValue {
    fn from(v: Time) -> Self {
        FieldValue::Time(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => FieldValue::Null,
        }
    }
}
