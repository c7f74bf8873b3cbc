// Voucher validation rules
//
// Checks run in a fixed order and the first failure wins: expired, global cap,
// not started, per-user cap, nothing it applies to.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::vouchers::error::VoucherError;
use crate::vouchers::models::{
    CreateVoucherRequest, NewVoucher, UnpaidItem, UsageCounts, Voucher,
};

/// Trimmed code, or an error if blank
pub fn check_code(code: &str) -> Result<&str, VoucherError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(VoucherError::NoCodeProvided);
    }
    Ok(code)
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::seconds(1)
}

/// Whether the voucher can be used by this user on any of their unpaid items
pub fn validate(
    voucher: &Voucher,
    usage: UsageCounts,
    unpaid: &[UnpaidItem],
    now: DateTime<Utc>,
) -> Result<(), VoucherError> {
    if voucher.has_expired(now) {
        return Err(VoucherError::Rejected("Voucher code has expired".into()));
    }
    if let Some(max) = voucher.max_vouchers {
        if usage.total >= max as i64 {
            return Err(VoucherError::Rejected(
                "Voucher has limited number of uses and has now expired".into(),
            ));
        }
    }
    if !voucher.has_started(now) {
        return Err(VoucherError::Rejected(format!(
            "Voucher code is not valid until {}",
            voucher.start_date.format("%d %b %y")
        )));
    }
    if let Some(max) = voucher.max_per_user {
        if usage.by_user >= max as i64 {
            return Err(VoucherError::Rejected(format!(
                "Voucher code has already been used the maximum number of times ({})",
                max
            )));
        }
    }
    if !unpaid.iter().any(|item| voucher.applies_to(item.type_id)) {
        return Err(VoucherError::Rejected(format!(
            "Code is not valid for any of your currently unpaid {}",
            voucher.kind.items()
        )));
    }
    Ok(())
}

/// Whether another redemption fits under both caps
pub fn has_allowance(voucher: &Voucher, usage: UsageCounts) -> bool {
    voucher.max_vouchers.map_or(true, |max| usage.total < max as i64)
        && voucher.max_per_user.map_or(true, |max| usage.by_user < max as i64)
}

/// Build a voucher from a create request, normalising its dates
pub fn new_voucher(request: CreateVoucherRequest, today: NaiveDate) -> Result<NewVoucher, VoucherError> {
    if !(1..=100).contains(&request.discount) {
        return Err(VoucherError::InvalidVoucher(
            "Discount must be between 1 and 100".into(),
        ));
    }
    let start = request.start_date.unwrap_or(today);
    if let Some(expiry) = request.expiry_date {
        if expiry < start {
            return Err(VoucherError::InvalidVoucher(
                "Expiry date must be after start date".into(),
            ));
        }
    }
    let mut applicable_type_ids = request.applicable_type_ids;
    applicable_type_ids.sort_unstable();
    applicable_type_ids.dedup();

    Ok(NewVoucher {
        kind: request.kind,
        code: check_code(&request.code)?.to_string(),
        discount: request.discount,
        start_date: start_of_day(start),
        expiry_date: request.expiry_date.map(end_of_day),
        max_vouchers: request.max_vouchers,
        max_per_user: request.max_per_user,
        activated: request.activated,
        applicable_type_ids,
    })
}
