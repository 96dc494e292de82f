//! The fixed operation list of a daily run

use crate::tx::{max_uint160, Operation, TokenRef, MAX_UINT48};

use ethers::types::{Address, U256};

/// Label of the permit registry in operation names
const PERMIT_REGISTRY_LABEL: &str = "Permit2";

/// Addresses and amounts the daily plan is built from
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub fee_manager: Address,
    pub permit_registry: Address,
    pub fee_token: TokenRef,
    pub tokens: Vec<TokenRef>,
    pub sink: Address,
    /// Per-transfer amount in the token's smallest unit
    pub transfer_amount: U256,
}

/// Fee preference, one transfer per token, then the two permit allowances
pub fn daily_plan(inputs: PlanInputs) -> Vec<Operation> {
    let PlanInputs {
        fee_manager,
        permit_registry,
        fee_token,
        tokens,
        sink,
        transfer_amount,
    } = inputs;

    let mut plan = Vec::with_capacity(tokens.len() + 3);
    plan.push(Operation::fee_preference(fee_manager, fee_token.clone()));
    plan.extend(
        tokens
            .into_iter()
            .map(|token| Operation::transfer(token, sink, transfer_amount)),
    );
    plan.push(Operation::approve(
        fee_token.clone(),
        permit_registry,
        PERMIT_REGISTRY_LABEL,
        U256::MAX,
    ));
    plan.push(Operation::registry_approve(
        permit_registry,
        PERMIT_REGISTRY_LABEL,
        fee_token,
        sink,
        max_uint160(),
        MAX_UINT48,
    ));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::operation::OperationKind;

    fn inputs() -> PlanInputs {
        PlanInputs {
            fee_manager: Address::repeat_byte(0xfe),
            permit_registry: Address::repeat_byte(0x44),
            fee_token: TokenRef::new("AlphaUSD", Address::repeat_byte(0x21)),
            tokens: vec![
                TokenRef::new("pathUSD", Address::repeat_byte(0x20)),
                TokenRef::new("AlphaUSD", Address::repeat_byte(0x21)),
                TokenRef::new("BetaUSD", Address::repeat_byte(0x22)),
            ],
            sink: Address::repeat_byte(0x99),
            transfer_amount: U256::from(1_000_000u64),
        }
    }

    #[test]
    fn test_daily_plan_order() {
        let names: Vec<String> = daily_plan(inputs()).into_iter().map(|op| op.name).collect();
        assert_eq!(
            names,
            vec![
                "feePreference:setUserToken(AlphaUSD)",
                "transfer:pathUSD",
                "transfer:AlphaUSD",
                "transfer:BetaUSD",
                "approve:AlphaUSD->Permit2(MaxUint256)",
                "registryApprove:Permit2.approve(AlphaUSD,SINK,MaxUint160,MaxUint48)",
            ]
        );
    }

    #[test]
    fn test_transfers_go_to_sink() {
        let plan = daily_plan(inputs());
        for op in &plan[1..4] {
            match &op.kind {
                OperationKind::Transfer {
                    recipient, amount, ..
                } => {
                    assert_eq!(*recipient, Address::repeat_byte(0x99));
                    assert_eq!(*amount, U256::from(1_000_000u64));
                }
                other => panic!("unexpected kind {:?}", other),
            }
        }
    }
}
