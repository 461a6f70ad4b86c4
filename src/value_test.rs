use crate::value::{Date, Datetime, FieldKind, FieldValue, FieldView, Time};

#[test]
fn test_kind_matches_variant() {
    assert_eq!(FieldView::Null.kind(), FieldKind::Null);
    assert_eq!(FieldView::Int(-1).kind(), FieldKind::Int);
    assert_eq!(FieldView::Uint(1).kind(), FieldKind::Uint);
    assert_eq!(FieldView::Bytes(b"abc").kind(), FieldKind::Bytes);
    assert_eq!(FieldView::Float(1.0).kind(), FieldKind::Float);
    assert_eq!(FieldView::Double(1.0).kind(), FieldKind::Double);
    assert_eq!(FieldValue::from("abc").kind(), FieldKind::Bytes);
}

#[test]
fn test_cross_sign_integer_equality() {
    // equal when both non-negative and numerically equal
    assert_eq!(FieldView::Int(42), FieldView::Uint(42));
    assert_eq!(FieldView::Uint(0), FieldView::Int(0));

    // negative never equals unsigned
    assert_ne!(FieldView::Int(-1), FieldView::Uint(u64::MAX));
    assert_ne!(FieldView::Int(-42), FieldView::Uint(42));

    // i64::MAX as u64 still compares
    assert_eq!(
        FieldView::Int(i64::MAX),
        FieldView::Uint(i64::MAX as u64)
    );
    assert_ne!(FieldView::Int(i64::MAX), FieldView::Uint(u64::MAX));
}

#[test]
fn test_distinct_variants_never_equal() {
    assert_ne!(FieldView::Null, FieldView::Int(0));
    assert_ne!(FieldView::Int(1), FieldView::Float(1.0));
    assert_ne!(FieldView::Float(1.0), FieldView::Double(1.0));
    assert_ne!(FieldView::Bytes(b"1"), FieldView::Int(1));
    assert_ne!(
        FieldView::Date(Date {
            year: 2020,
            month: 1,
            day: 1
        }),
        FieldView::Datetime(Datetime {
            year: 2020,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            microsecond: 0
        })
    );
}

#[test]
fn test_float_nan_is_unequal() {
    assert_ne!(FieldView::Float(f32::NAN), FieldView::Float(f32::NAN));
    assert_ne!(FieldView::Double(f64::NAN), FieldView::Double(f64::NAN));
}

#[test]
fn test_view_owned_round_trip() {
    let backing = b"hello".to_vec();
    let view = FieldView::Bytes(&backing);
    let owned = view.to_owned();
    drop(backing);
    assert_eq!(owned, FieldValue::Bytes(b"hello".to_vec()));
    assert_eq!(owned.as_view().as_str(), Some("hello"));
}

#[test]
fn test_owned_and_view_compare() {
    let owned = FieldValue::from(7u32);
    assert_eq!(owned, FieldView::Uint(7));
    assert_eq!(FieldView::Int(7), owned);
}

#[test]
fn test_time_zero_has_no_sign() {
    let t = Time::new(true, 0, 0, 0, 0);
    assert!(!t.negative);
    assert!(t.is_zero());

    let t = Time::new(true, 0, 0, 1, 0);
    assert!(t.negative);
    assert!(!t.is_zero());

    assert_eq!(Time::new(true, 0, 0, 0, 0), Time::new(false, 0, 0, 0, 0));
}

#[test]
fn test_option_conversion() {
    assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
    assert_eq!(FieldValue::from(Some(3i64)), FieldValue::Int(3));
}
