//! Macro for implementing wire-name conversions on fieldless enums
//!
//! Event kinds, error kinds and auth notifications all travel as fixed
//! strings (in logs, metrics labels and the remote client's callbacks). The
//! macro gives each enum `as_str`, `Display` and a case-insensitive
//! `FromStr` from one mapping.
//!
//! # Example
//!
//! ```rust
//! use unimoghub_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LinkState {
//!     Online,
//!     Offline,
//! }
//!
//! impl_wire_name_conversions!(LinkState {
//!     Online => "online",
//!     Offline => "offline",
//! });
//!
//! assert_eq!(LinkState::Online.to_string(), "online");
//! assert_eq!("OFFLINE".parse::<LinkState>(), Ok(LinkState::Offline));
//! ```

/// Implements `as_str`, Display and FromStr for fieldless enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their wire names
///
/// Parsing ignores ASCII case; output always uses the mapped spelling.
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Wire name of this variant
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Notice {
        SignedIn,
        SignedOut,
    }

    impl_wire_name_conversions!(Notice {
        SignedIn => "SIGNED_IN",
        SignedOut => "SIGNED_OUT",
    });

    #[test]
    fn test_display_uses_mapped_spelling() {
        assert_eq!(Notice::SignedIn.to_string(), "SIGNED_IN");
        assert_eq!(Notice::SignedOut.as_str(), "SIGNED_OUT");
    }

    #[test]
    fn test_fromstr_ignores_case() {
        assert_eq!(Notice::from_str("signed_in").unwrap(), Notice::SignedIn);
        assert_eq!(Notice::from_str("Signed_Out").unwrap(), Notice::SignedOut);
    }

    #[test]
    fn test_fromstr_invalid() {
        let result = Notice::from_str("token_refreshed");
        assert!(result.unwrap_err().contains("Invalid Notice: token_refreshed"));
        assert!(Notice::from_str("").is_err());
    }
}
