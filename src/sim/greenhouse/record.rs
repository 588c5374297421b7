//! Fixed records of named `f64` quantities.
//!
//! State, actuator and flux records are plain structs with one `f64` per
//! physical quantity. The macro below also generates the field-name table and
//! ordered value access used for vector arithmetic in the integrator, for
//! finiteness checks, and for tabular export. Callers add `Default` (derived
//! or hand-written) and serde container attributes themselves.

macro_rules! named_record {
    (
        $(#[$outer:meta])*
        pub struct $name:ident {
            $(
                $(#[$inner:meta])*
                $field:ident
            ),* $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
        $(#[$outer])*
        pub struct $name {
            $(
                $(#[$inner])*
                pub $field: f64,
            )*
        }

        impl $name {
            /// Field names in declaration order.
            pub const FIELD_NAMES: &'static [&'static str] = &[$(stringify!($field)),*];

            /// Number of fields.
            pub const LEN: usize = Self::FIELD_NAMES.len();

            /// Field values in declaration order.
            pub fn values(&self) -> Vec<f64> {
                vec![$(self.$field),*]
            }

            /// Builds the record from values in declaration order.
            ///
            /// Returns `None` if the slice length does not match [`Self::LEN`].
            pub fn from_values(values: &[f64]) -> Option<Self> {
                if values.len() != Self::LEN {
                    return None;
                }
                let mut it = values.iter().copied();
                Some(Self {
                    $($field: it.next()?,)*
                })
            }

            /// Combines two records field by field.
            pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
                Self {
                    $($field: f(self.$field, other.$field),)*
                }
            }

            /// `(name, value)` pairs in declaration order.
            pub fn named_values(&self) -> Vec<(&'static str, f64)> {
                Self::FIELD_NAMES.iter().copied().zip(self.values()).collect()
            }

            /// First field holding NaN or an infinity.
            pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
                self.named_values().into_iter().find(|(_, v)| !v.is_finite())
            }
        }
    };
}

pub(crate) use named_record;

#[cfg(test)]
mod tests {
    named_record! {
        /// Test record.
        #[derive(Default)]
        pub struct Pair {
            /// First.
            a,
            b,
        }
    }

    #[test]
    fn test_values_round_trip_in_declaration_order() {
        let p = Pair { a: 1.0, b: 2.0 };
        assert_eq!(Pair::FIELD_NAMES, &["a", "b"]);
        assert_eq!(Pair::LEN, 2);
        assert_eq!(p.values(), vec![1.0, 2.0]);
        assert_eq!(Pair::from_values(&[1.0, 2.0]), Some(p));
        assert_eq!(Pair::from_values(&[1.0]), None);
    }

    #[test]
    fn test_first_non_finite() {
        let p = Pair { a: 1.0, b: f64::NAN };
        let (name, v) = p.first_non_finite().unwrap();
        assert_eq!(name, "b");
        assert!(v.is_nan());
        assert!(Pair::default().first_non_finite().is_none());
    }

    #[test]
    fn test_zip_with() {
        let p = Pair { a: 1.0, b: 2.0 };
        let q = Pair { a: 10.0, b: 20.0 };
        assert_eq!(p.zip_with(&q, |x, y| x + 0.5 * y), Pair { a: 6.0, b: 12.0 });
    }
}
