//! Canned kiosk sessions
//!
//! Each step names the state the kiosk is expected to be in and the input
//! fed there. Voice steps carry the intent a scripted classifier returns for
//! the utterance.

use clap::ValueEnum;
use serde_json::Value;
use teller_api::{Decision, Input};
use teller_host_sim::SimSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Card printed and collected
    Happy,
    /// No card stock; customer accepts branch pickup
    Stockout,
    /// Wrong OTP until the attempt limit
    OtpWrong,
    /// Card printed but never collected
    PickupTimeout,
    /// Read inputs from stdin
    Interactive,
}

#[derive(Debug, Clone)]
pub enum StepInput {
    Voice {
        text: &'static str,
        intent: &'static str,
        params: Vec<(&'static str, &'static str)>,
    },
    Signal(&'static str),
    /// Advance the driver clock without input
    Wait(u64),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub state: &'static str,
    pub input: StepInput,
}

impl Step {
    fn voice(state: &'static str, text: &'static str, intent: &'static str) -> Self {
        Self {
            state,
            input: StepInput::Voice {
                text,
                intent,
                params: Vec::new(),
            },
        }
    }

    fn voice_with(
        state: &'static str,
        text: &'static str,
        intent: &'static str,
        params: &[(&'static str, &'static str)],
    ) -> Self {
        Self {
            state,
            input: StepInput::Voice {
                text,
                intent,
                params: params.to_vec(),
            },
        }
    }

    fn signal(state: &'static str, signal: &'static str) -> Self {
        Self {
            state,
            input: StepInput::Signal(signal),
        }
    }

    fn wait(state: &'static str, secs: u64) -> Self {
        Self {
            state,
            input: StepInput::Wait(secs),
        }
    }

    /// Engine input for this step, if any
    pub fn to_input(&self) -> Option<Input> {
        match &self.input {
            StepInput::Voice { text, .. } => Some(Input::voice(*text)),
            StepInput::Signal(signal) => Some(Input::system(*signal)),
            StepInput::Wait(_) => None,
        }
    }

    /// Decision a scripted classifier should return for this step
    pub fn scripted_decision(&self) -> Option<Decision> {
        match &self.input {
            StepInput::Voice { intent, params, .. } => Some(
                params
                    .iter()
                    .fold(Decision::new(*intent), |d, (k, v)| {
                        d.with_param(*k, Value::String(v.to_string()))
                    }),
            ),
            _ => None,
        }
    }
}

const FIXED_OTP: &str = "482913";

impl Scenario {
    /// Device behavior for this scenario
    pub fn settings(self) -> SimSettings {
        SimSettings {
            stock_ok: self != Scenario::Stockout,
            otp_fixed: Some(FIXED_OTP.to_string()),
            ..SimSettings::default()
        }
    }

    /// Terminal state the scenario should end in
    pub fn expected_end(self) -> Option<&'static str> {
        match self {
            Scenario::Happy | Scenario::Stockout => Some("DONE"),
            Scenario::OtpWrong => Some("FAILED"),
            Scenario::PickupTimeout => Some("RETRACTED"),
            Scenario::Interactive => None,
        }
    }

    pub fn steps(self) -> Vec<Step> {
        let mut steps = vec![
            Step::voice("START", "tôi muốn phát hành lại thẻ", "reissue_card"),
            Step::signal("FACE", "face_ok"),
            Step::signal("ID_SCAN", "id_ok"),
            Step::signal("NFC_READ", "nfc_ok"),
            Step::voice_with(
                "CARD_SELECT",
                "thẻ ghi nợ",
                "select_card_type",
                &[("card_type", "debit")],
            ),
            Step::voice_with(
                "ACCOUNT_SELECT",
                "tài khoản thanh toán",
                "select_account",
                &[("account", "checking")],
            ),
        ];

        match self {
            Scenario::Happy | Scenario::PickupTimeout => {}
            Scenario::Stockout => steps.push(Step::signal("BRANCH_SELECT", "confirm_branch")),
            Scenario::OtpWrong => {
                steps.push(Step::signal("OTP_SEND", "_auto"));
                for code in ["111111", "222222", "333333", "444444", "555555", "666666"] {
                    steps.push(Step::voice_with("OTP", code, "provide_otp", &[("otp", code)]));
                }
                return steps;
            }
            Scenario::Interactive => return Vec::new(),
        }

        steps.push(Step::signal("OTP_SEND", "_auto"));
        steps.push(Step::voice_with(
            "OTP",
            "bốn tám hai chín một ba",
            "provide_otp",
            &[("otp", FIXED_OTP)],
        ));

        if self == Scenario::PickupTimeout {
            steps.push(Step::wait("CARD_PICKUP", 46));
        } else {
            steps.push(Step::signal("CARD_PICKUP", "card_taken"));
        }
        steps
    }
}
