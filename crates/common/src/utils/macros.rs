//! Macros for reducing boilerplate code

/// Implements Display and FromStr for enums with a fixed textual form
///
/// Parsing is case-insensitive; the output is always the string given in the
/// mapping. Used for values read from environment variables and logs.
///
/// # Example
///
/// ```rust
/// use docrecover_common::impl_status_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum SlotState {
///     Idle,
///     Busy,
/// }
///
/// impl_status_conversions!(SlotState {
///     Idle => "idle",
///     Busy => "busy",
/// });
///
/// assert_eq!("BUSY".parse::<SlotState>(), Ok(SlotState::Busy));
/// assert_eq!(SlotState::Idle.to_string(), "idle");
/// ```
#[macro_export]
macro_rules! impl_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fallback {
        DirectView,
        DownloadOnly,
    }

    impl_status_conversions!(Fallback {
        DirectView => "direct-view",
        DownloadOnly => "download-only",
    });

    #[test]
    fn test_display_uses_mapping() {
        assert_eq!(Fallback::DirectView.to_string(), "direct-view");
        assert_eq!(Fallback::DownloadOnly.to_string(), "download-only");
    }

    #[test]
    fn test_parse_ignores_case_and_whitespace() {
        assert_eq!(Fallback::from_str("Direct-View"), Ok(Fallback::DirectView));
        assert_eq!(Fallback::from_str(" download-only\n"), Ok(Fallback::DownloadOnly));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = Fallback::from_str("static").unwrap_err();
        assert!(err.contains("Invalid Fallback: static"));
        assert!(Fallback::from_str("").is_err());
    }
}
