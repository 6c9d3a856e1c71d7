//! Simulated kiosk action executor

use async_trait::async_trait;
use teller_api::{ActionKind, ActionOutcome, ActionSpec};
use teller_host_api::{ActionExecutor, ContextAccess, ExecutorError, ExecutorResult};
use tracing::info;
use uuid::Uuid;

use crate::SimSettings;

/// Context slot holding the OTP most recently sent to the customer
pub const OTP_EXPECTED_SLOT: &str = "otp_expected";

/// OTP lengths accepted when no code was sent in this transaction
const ACCEPTED_UNSENT_LENGTHS: [usize; 2] = [4, 6];

/// Action executor standing in for the kiosk's devices and bank APIs
#[derive(Debug, Clone, Default)]
pub struct SimulatedKiosk {
    settings: SimSettings,
}

impl SimulatedKiosk {
    pub fn new(settings: SimSettings) -> Self {
        Self { settings }
    }

    pub fn from_env() -> Self {
        Self::new(SimSettings::from_env())
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    fn api(&self, action: &ActionSpec, ctx: &mut dyn ContextAccess) -> ActionOutcome {
        match action.name.as_str() {
            "check_card_stock" => {
                let ok = self.settings.stock_ok;
                info!(stock_ok = ok, "API check_card_stock");
                ActionOutcome::signal(if ok { "stock_ok" } else { "stock_out" })
            }
            "send_otp" => {
                let otp = self
                    .settings
                    .otp_fixed
                    .clone()
                    .unwrap_or_else(|| generate_otp(self.settings.otp_length));
                info!(otp = %otp, "API send_otp (demo)");
                ctx.set_slot(OTP_EXPECTED_SLOT, otp);
                ActionOutcome::none()
            }
            "resend_otp" => {
                let otp = ctx
                    .slot(OTP_EXPECTED_SLOT)
                    .map(str::to_string)
                    .unwrap_or_else(|| generate_otp(self.settings.otp_length));
                info!(otp = %otp, "API resend_otp (demo)");
                ctx.set_slot(OTP_EXPECTED_SLOT, otp);
                ActionOutcome::none()
            }
            "verify_otp" => {
                let given = arg_text(action, "otp");
                let expected = ctx.slot(OTP_EXPECTED_SLOT).unwrap_or_default();
                let ok = if expected.is_empty() {
                    ACCEPTED_UNSENT_LENGTHS.contains(&given.chars().count())
                } else {
                    given == expected
                };
                info!(given = %given, expected = %expected, ok, "API verify_otp");
                ActionOutcome::signal(if ok { "otp_ok" } else { "otp_wrong" })
            }
            "print_card" => {
                let ok = self.settings.print_ok;
                info!(print_ok = ok, "API print_card");
                ActionOutcome::signal(if ok { "printed" } else { "print_fail" })
            }
            "retract_card" => {
                info!("API retract_card");
                ActionOutcome::signal("timeout_retract")
            }
            other => {
                info!(name = other, args = ?action.args, "API call not simulated");
                ActionOutcome::none()
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for SimulatedKiosk {
    async fn run(
        &self,
        action: &ActionSpec,
        ctx: &mut dyn ContextAccess,
    ) -> ExecutorResult<ActionOutcome> {
        match action.kind {
            ActionKind::Ui => {
                info!(screen = %action.name, args = ?action.args, "UI");
                Ok(ActionOutcome::none())
            }
            ActionKind::Tts => {
                info!(text = %arg_text(action, "text"), "TTS speak");
                Ok(ActionOutcome::none())
            }
            ActionKind::Api => Ok(self.api(action, ctx)),
            ActionKind::Clock => Err(ExecutorError::Unsupported(action.to_string())),
        }
    }

    fn name(&self) -> &str {
        "simulated-kiosk"
    }
}

/// Argument as text; numbers are accepted for codes read out as digits
fn arg_text(action: &ActionSpec, key: &str) -> String {
    match action.args.get(key) {
        Some(value) if value.is_number() => value.to_string(),
        Some(value) => value.as_str().unwrap_or_default().trim().to_string(),
        None => String::new(),
    }
}

/// Byte offsets of the version and variant bits in a v4 UUID
const UUID_FIXED_BYTES: [usize; 2] = [6, 8];

/// The fully random bytes of a v4 UUID
fn random_bytes(uuid: &Uuid) -> impl Iterator<Item = u8> + '_ {
    uuid.as_bytes()
        .iter()
        .enumerate()
        .filter(|(i, _)| !UUID_FIXED_BYTES.contains(i))
        .map(|(_, byte)| *byte)
}

/// Random decimal code of `length` digits
pub fn generate_otp(length: usize) -> String {
    let mut digits = String::with_capacity(length);
    while digits.len() < length {
        let uuid = Uuid::new_v4();
        // Bytes of 250 and above would favour the digits 0 to 5
        for byte in random_bytes(&uuid).filter(|b| *b < 250) {
            if digits.len() == length {
                break;
            }
            digits.push(char::from(b'0' + byte % 10));
        }
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_host_api::MemoryContext;

    fn kiosk(settings: SimSettings) -> SimulatedKiosk {
        SimulatedKiosk::new(settings)
    }

    fn api(name: &str) -> ActionSpec {
        ActionSpec::new(ActionKind::Api, name)
    }

    async fn signal(kiosk: &SimulatedKiosk, action: &ActionSpec, ctx: &mut MemoryContext) -> Option<String> {
        kiosk.run(action, ctx).await.unwrap().signal
    }

    #[tokio::test]
    async fn stock_and_printer_follow_settings() {
        let mut ctx = MemoryContext::default();
        let happy = kiosk(SimSettings::default());
        assert_eq!(signal(&happy, &api("check_card_stock"), &mut ctx).await.as_deref(), Some("stock_ok"));
        assert_eq!(signal(&happy, &api("print_card"), &mut ctx).await.as_deref(), Some("printed"));

        let broken = kiosk(SimSettings {
            stock_ok: false,
            print_ok: false,
            ..SimSettings::default()
        });
        assert_eq!(signal(&broken, &api("check_card_stock"), &mut ctx).await.as_deref(), Some("stock_out"));
        assert_eq!(signal(&broken, &api("print_card"), &mut ctx).await.as_deref(), Some("print_fail"));
    }

    #[tokio::test]
    async fn otp_round_trip_with_fixed_code() {
        let kiosk = kiosk(SimSettings {
            otp_fixed: Some("482913".into()),
            ..SimSettings::default()
        });
        let mut ctx = MemoryContext::default();

        assert_eq!(signal(&kiosk, &api("send_otp"), &mut ctx).await, None);
        assert_eq!(ctx.slot(OTP_EXPECTED_SLOT), Some("482913"));

        let right = api("verify_otp").with_arg("otp", "482913");
        let wrong = api("verify_otp").with_arg("otp", "111111");
        assert_eq!(signal(&kiosk, &right, &mut ctx).await.as_deref(), Some("otp_ok"));
        assert_eq!(signal(&kiosk, &wrong, &mut ctx).await.as_deref(), Some("otp_wrong"));

        signal(&kiosk, &api("resend_otp"), &mut ctx).await;
        assert_eq!(ctx.slot(OTP_EXPECTED_SLOT), Some("482913"));
    }

    #[tokio::test]
    async fn verify_without_sent_code_checks_length() {
        let kiosk = kiosk(SimSettings::default());
        let mut ctx = MemoryContext::default();

        for (otp, expected) in [("1234", "otp_ok"), ("123456", "otp_ok"), ("12345", "otp_wrong"), ("", "otp_wrong")] {
            let action = api("verify_otp").with_arg("otp", otp);
            assert_eq!(signal(&kiosk, &action, &mut ctx).await.as_deref(), Some(expected), "otp {otp:?}");
        }

        let numeric = api("verify_otp").with_arg("otp", 4829);
        assert_eq!(signal(&kiosk, &numeric, &mut ctx).await.as_deref(), Some("otp_ok"));
    }

    #[tokio::test]
    async fn generated_codes_have_requested_length() {
        let kiosk = kiosk(SimSettings {
            otp_length: 40,
            ..SimSettings::default()
        });
        let mut ctx = MemoryContext::default();
        signal(&kiosk, &api("send_otp"), &mut ctx).await;

        let otp = ctx.slot(OTP_EXPECTED_SLOT).unwrap();
        assert_eq!(otp.len(), 40);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn otp_skips_uuid_version_and_variant() {
        let uuid = Uuid::from_bytes(std::array::from_fn(|i| i as u8));
        let bytes: Vec<u8> = random_bytes(&uuid).collect();
        assert_eq!(bytes.len(), 14);
        assert!(!bytes.contains(&6));
        assert!(!bytes.contains(&8));
    }

    #[test]
    fn otp_digits_spread_evenly() {
        let mut counts = [0usize; 10];
        for c in generate_otp(20_000).bytes() {
            counts[usize::from(c - b'0')] += 1;
        }
        for (digit, count) in counts.iter().enumerate() {
            assert!((1_700..=2_300).contains(count), "digit {digit} seen {count} times");
        }
    }

    #[tokio::test]
    async fn retract_ui_tts_and_unknown_calls() {
        let kiosk = kiosk(SimSettings::default());
        let mut ctx = MemoryContext::default();

        assert_eq!(signal(&kiosk, &api("retract_card"), &mut ctx).await.as_deref(), Some("timeout_retract"));
        assert_eq!(signal(&kiosk, &api("open_account"), &mut ctx).await, None);

        let speak = ActionSpec::new(ActionKind::Tts, "speak").with_arg("text", "Xin chào");
        assert_eq!(signal(&kiosk, &speak, &mut ctx).await, None);
        let home = ActionSpec::new(ActionKind::Ui, "back_home");
        assert_eq!(signal(&kiosk, &home, &mut ctx).await, None);

        let clock = ActionSpec::new(ActionKind::Clock, "start_timer");
        assert!(kiosk.run(&clock, &mut ctx).await.is_err());
    }
}
