// Applying a voucher's discount to a list of items

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeSet;

use crate::vouchers::models::{DiscountedItem, UnpaidItem, UsageCounts, Voucher};

/// Cost after a percentage discount, rounded half-to-even to pence
pub fn discounted_price(cost: Decimal, discount: i32) -> Decimal {
    let discount = Decimal::from(discount.clamp(0, 100));
    (cost * (Decimal::ONE_HUNDRED - discount) / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Outcome of applying a voucher to a list of items
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub discounted: Vec<DiscountedItem>,
    /// Every item's cost, discounted where the voucher applied
    pub total: Decimal,
    pub messages: Vec<String>,
}

impl Application {
    pub fn applied_ids(&self) -> Vec<i32> {
        self.discounted.iter().map(|d| d.item_id).collect()
    }
}

/// Apply the voucher to `items` in order
///
/// Items of a type the voucher does not cover keep their cost. Once the
/// remaining per-user or total allowance runs out, later items keep theirs too.
pub fn apply(voucher: &Voucher, items: &[UnpaidItem], usage: UsageCounts) -> Application {
    let mut per_user_left = voucher.max_per_user.map(|max| max as i64 - usage.by_user);
    let mut total_left = voucher.max_vouchers.map(|max| max as i64 - usage.total);
    let mut per_user_exceeded = false;
    let mut total_exceeded = false;
    let mut invalid_types = BTreeSet::new();

    let mut discounted = Vec::new();
    let mut total = Decimal::ZERO;

    for item in items {
        let mut can_use = voucher.applies_to(item.type_id);
        if per_user_left.map_or(false, |left| left <= 0) {
            can_use = false;
            per_user_exceeded = true;
        }
        if total_left.map_or(false, |left| left <= 0) {
            can_use = false;
            total_exceeded = true;
        }

        if can_use {
            let cost = discounted_price(item.cost, voucher.discount);
            total += cost;
            discounted.push(DiscountedItem {
                item_id: item.id,
                original_cost: item.cost,
                cost,
            });
            if let Some(left) = per_user_left.as_mut() {
                *left -= 1;
            }
            if let Some(left) = total_left.as_mut() {
                *left -= 1;
            }
        } else {
            total += item.cost;
            // Refused with allowance left means the type is not covered
            if !(per_user_exceeded || total_exceeded) {
                invalid_types.insert(item.type_name.clone());
            }
        }
    }

    let mut messages = Vec::new();
    if !invalid_types.is_empty() {
        messages.push(format!(
            "Voucher cannot be used for some {} ({})",
            voucher.kind.item_types(),
            invalid_types.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    if per_user_exceeded {
        messages.push(format!(
            "Voucher not applied to some {}; you can only use this voucher a total of {} times.",
            voucher.kind.items(),
            voucher.max_per_user.unwrap_or_default()
        ));
    }
    if total_exceeded {
        messages.push(format!(
            "Voucher not applied to some {}; voucher has limited number of total uses.",
            voucher.kind.items()
        ));
    }

    Application {
        discounted,
        total,
        messages,
    }
}
