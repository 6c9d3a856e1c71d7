//! Environment-driven device behavior

/// Card stock level reported by `check_card_stock` (`ok` or anything else)
pub const STOCK_ENV: &str = "TELLER_STOCK";

/// Fixed OTP sent by `send_otp` instead of a generated one
pub const OTP_FIXED_ENV: &str = "TELLER_OTP_FIXED";

/// Digits in a generated OTP
pub const OTP_LENGTH_ENV: &str = "TELLER_OTP_LENGTH";

/// Printer result for `print_card` (`ok` or anything else)
pub const PRINT_ENV: &str = "TELLER_PRINT";

pub const DEFAULT_OTP_LENGTH: usize = 6;

/// How the simulated devices behave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSettings {
    pub stock_ok: bool,
    pub print_ok: bool,
    pub otp_fixed: Option<String>,
    pub otp_length: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            stock_ok: true,
            print_ok: true,
            otp_fixed: None,
            otp_length: DEFAULT_OTP_LENGTH,
        }
    }
}

impl SimSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let is_ok = |value: Option<String>, default: bool| {
            value.map_or(default, |v| v.trim().eq_ignore_ascii_case("ok"))
        };

        let otp_length = match lookup(OTP_LENGTH_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(len) if len > 0 => len,
                _ => {
                    tracing::warn!(value = %raw, "Invalid {}, using {}", OTP_LENGTH_ENV, DEFAULT_OTP_LENGTH);
                    DEFAULT_OTP_LENGTH
                }
            },
            None => defaults.otp_length,
        };

        Self {
            stock_ok: is_ok(lookup(STOCK_ENV), defaults.stock_ok),
            print_ok: is_ok(lookup(PRINT_ENV), defaults.print_ok),
            otp_fixed: lookup(OTP_FIXED_ENV)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            otp_length,
        }
    }
}
