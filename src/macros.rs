//! Macros for code generation in descriptor types.
//!
//! This module provides [`define_flags!`], which generates the small bitset
//! types used for per-field and per-record policies (ignore-value modes,
//! validation modes). Each generated type is `Copy`, combines with `|`, and
//! serializes as its raw bits.

/// Macro to generate a bitset policy type.
///
/// # Example
///
/// ```ignore
/// define_flags! {
///     /// Which sides to trim.
///     TrimMode {
///         /// Trim the start
///         START = 0b01,
///         /// Trim the end
///         END = 0b10,
///     }
/// }
///
/// let both = TrimMode::START | TrimMode::END;
/// assert!(both.contains(TrimMode::END));
/// ```
macro_rules! define_flags {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$flag_meta:meta])*
                $flag:ident = $bits:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            /// No flags set.
            pub const NONE: Self = Self(0);
            $(
                $(#[$flag_meta])*
                pub const $flag: Self = Self($bits);
            )*

            /// Raw bit representation.
            #[must_use]
            pub const fn bits(self) -> u8 {
                self.0
            }

            /// Returns `true` when no flag is set.
            #[must_use]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns `true` if every flag of `other` is set in `self`.
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns `true` if any flag of `other` is set in `self`.
            #[must_use]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    define_flags! {
        /// Test flags.
        Sample {
            /// first
            A = 0b01,
            /// second
            B = 0b10,
        }
    }

    #[test]
    fn test_define_flags_macro() {
        let both = Sample::A | Sample::B;
        assert!(both.contains(Sample::A));
        assert!(both.contains(Sample::A | Sample::B));
        assert!(!Sample::A.contains(Sample::B));
        assert!(Sample::A.intersects(both));
        assert!(Sample::NONE.is_empty());
        assert_eq!(Sample::default(), Sample::NONE);

        let mut flags = Sample::NONE;
        flags |= Sample::B;
        assert_eq!(flags.bits(), 0b10);
        assert_eq!(serde_json::to_string(&flags).unwrap(), "2");
    }
}
