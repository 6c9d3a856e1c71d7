//! Guard and after-effect evaluation
//!
//! Expressions only ever read or write the transaction's counters and
//! flags; nothing else is reachable from rule data.

use teller_config::{Assignment, Effect, Guard, GuardExpr, IntOperand};

use crate::TransactionContext;

/// An absent guard always holds
pub fn guard_holds(guard: Option<&Guard>, ctx: &TransactionContext) -> bool {
    guard.is_none_or(|g| evaluate(&g.expr, ctx))
}

pub fn evaluate(expr: &GuardExpr, ctx: &TransactionContext) -> bool {
    match expr {
        GuardExpr::Literal(value) => *value,
        GuardExpr::Flag(index) => ctx.flag_at(*index),
        GuardExpr::CompareInt { lhs, op, rhs } => op.apply(operand(lhs, ctx), operand(rhs, ctx)),
        GuardExpr::CompareBool { lhs, equal, rhs } => {
            (evaluate(lhs, ctx) == evaluate(rhs, ctx)) == *equal
        }
        GuardExpr::Not(inner) => !evaluate(inner, ctx),
        GuardExpr::And(lhs, rhs) => evaluate(lhs, ctx) && evaluate(rhs, ctx),
        GuardExpr::Or(lhs, rhs) => evaluate(lhs, ctx) || evaluate(rhs, ctx),
    }
}

fn operand(operand: &IntOperand, ctx: &TransactionContext) -> u32 {
    match operand {
        IntOperand::Counter(index) => ctx.counter_at(*index),
        IntOperand::Literal(value) => *value,
    }
}

/// Run every statement of an after-effect, in order
pub fn apply_effect(effect: Option<&Effect>, ctx: &mut TransactionContext) {
    let Some(effect) = effect else {
        return;
    };

    for statement in &effect.statements {
        match *statement {
            Assignment::SetCounter { index, value } => ctx.set_counter_at(index, value),
            Assignment::AddCounter { index, amount } => {
                let value = ctx.counter_at(index).saturating_add(amount);
                ctx.set_counter_at(index, value);
            }
            Assignment::SetFlag { index, value } => ctx.set_flag_at(index, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teller_config::ContextSchema;
    use teller_host_api::ContextAccess;

    fn schema() -> Arc<ContextSchema> {
        Arc::new(ContextSchema::new(
            [("otp_fail".to_string(), 0), ("id_retry".to_string(), 0)],
            [
                ("stock_checked".to_string(), false),
                ("risk_flag".to_string(), false),
            ],
        ))
    }

    fn guard(source: &str) -> Guard {
        Guard::parse(source, &schema()).unwrap()
    }

    fn effect(source: &str) -> Effect {
        Effect::parse(source, &schema()).unwrap()
    }

    #[test]
    fn absent_guard_holds() {
        let ctx = TransactionContext::new(schema());
        assert!(guard_holds(None, &ctx));
    }

    #[test]
    fn counter_threshold_guard() {
        let mut ctx = TransactionContext::new(schema());
        let g = guard("ctx.otp_fail < 5");

        ctx.set_counter("otp_fail", 4);
        assert!(guard_holds(Some(&g), &ctx));
        ctx.set_counter("otp_fail", 5);
        assert!(!guard_holds(Some(&g), &ctx));
    }

    #[test]
    fn boolean_combinations() {
        let mut ctx = TransactionContext::new(schema());
        ctx.set_flag("stock_checked", true);

        assert!(guard_holds(Some(&guard("stock_checked and not risk_flag")), &ctx));
        assert!(guard_holds(Some(&guard("risk_flag == False")), &ctx));
        assert!(guard_holds(Some(&guard("risk_flag || id_retry <= 0")), &ctx));
        assert!(!guard_holds(Some(&guard("!(stock_checked) && true")), &ctx));
        assert!(guard_holds(Some(&guard("otp_fail == id_retry")), &ctx));
    }

    #[test]
    fn effects_apply_in_order() {
        let mut ctx = TransactionContext::new(schema());
        apply_effect(
            Some(&effect("otp_fail += 1; otp_fail += 2\nstock_checked = True; id_retry = 7")),
            &mut ctx,
        );

        assert_eq!(ctx.counter("otp_fail"), Some(3));
        assert_eq!(ctx.counter("id_retry"), Some(7));
        assert_eq!(ctx.flag("stock_checked"), Some(true));
    }

    #[test]
    fn increments_saturate() {
        let mut ctx = TransactionContext::new(schema());
        ctx.set_counter("otp_fail", u32::MAX - 1);
        apply_effect(Some(&effect("otp_fail += 5")), &mut ctx);
        assert_eq!(ctx.counter("otp_fail"), Some(u32::MAX));
    }

    #[test]
    fn absent_effect_is_noop() {
        let mut ctx = TransactionContext::new(schema());
        let before = ctx.clone();
        apply_effect(None, &mut ctx);
        assert_eq!(ctx, before);
    }
}
