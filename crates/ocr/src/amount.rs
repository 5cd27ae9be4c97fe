use regex::{Captures, Match};
use rust_decimal::Decimal;
use snap_core::AmountLocale;
use std::str::FromStr;

use crate::rules::{line_at, scan, FieldRule, Matched, RuleContext};

/// Parse a grouped number such as `1.500.000`, `1,234.56` or `500,50` into an
/// exact decimal.
///
/// * several separators of one kind are thousands separators;
/// * with both kinds present, the last separator is the decimal mark and must
///   be followed by one or two digits;
/// * a single separator followed by one or two digits is a decimal mark;
/// * a single separator followed by exactly three digits is read according to
///   `locale`.
///
/// Anything else (`1.2.3`, `12,34,567`, `1..5`) is rejected.
pub fn normalize_amount(raw: &str, locale: AmountLocale) -> Option<Decimal> {
    let raw = raw.trim();
    let well_formed = raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        && raw.starts_with(|c: char| c.is_ascii_digit())
        && raw.ends_with(|c: char| c.is_ascii_digit());
    if !well_formed {
        return None;
    }

    let seps: Vec<char> = raw.chars().filter(|c| *c == '.' || *c == ',').collect();
    let groups: Vec<&str> = raw.split(['.', ',']).collect();
    if groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let thousands_ok =
        |gs: &[&str]| gs[0].len() <= 3 && gs[1..].iter().all(|g| g.len() == 3);

    let canonical = match seps.as_slice() {
        [] => raw.to_string(),
        [sep] => {
            let (int, frac) = (groups[0], groups[1]);
            match frac.len() {
                1 | 2 => format!("{int}.{frac}"),
                3 if *sep == locale.thousands_separator() => {
                    if int.len() > 3 {
                        return None;
                    }
                    format!("{int}{frac}")
                }
                3 => format!("{int}.{frac}"),
                _ => return None,
            }
        }
        [init @ .., last] => {
            if init.iter().all(|c| c == last) {
                if !thousands_ok(&groups[..]) {
                    return None;
                }
                groups.concat()
            } else {
                if init.iter().any(|c| c == last) || init.iter().any(|c| *c != init[0]) {
                    return None;
                }
                let (frac, int_groups) = groups.split_last()?;
                if !(1..=2).contains(&frac.len()) || !thousands_ok(int_groups) {
                    return None;
                }
                format!("{}.{}", int_groups.concat(), frac)
            }
        }
    };
    Decimal::from_str(&canonical).ok()
}

// ── Direction ────────────────────────────────────────────────────────────────

re!(
    re_direction,
    r"(?i)(?P<neg>\b(?:sent|paid|payment|debit(?:ed)?|withdraw(?:al|n)?|transfer(?:red)?\s+to|chuyển\s*tiền|chuyển\s*khoản|chuyen\s*tien|chuyen\s*khoan|thanh\s*toán|thanh\s*toan|ghi\s*nợ|ghi\s*no|rút\s*tiền|rut\s*tien|trừ)\b)|(?P<pos>\b(?:received?|credit(?:ed)?|deposit(?:ed)?|refund(?:ed)?|transfer(?:red)?\s+from|nhận\s*tiền|nhan\s*tien|nhận|ghi\s*có|ghi\s*co|hoàn\s*tiền|hoan\s*tien|cộng)\b)"
);

/// Sign implied by a direction keyword on `line`; the leftmost keyword wins.
fn keyword_sign(line: &str) -> Option<bool> {
    let caps = re_direction().captures(line)?;
    Some(caps.name("neg").is_some())
}

fn explicit_sign(sign: Option<&str>) -> Option<bool> {
    match sign? {
        "-" | "−" | "–" => Some(true),
        "+" => Some(false),
        _ => None,
    }
}

/// A sign must touch what follows it or open the line. Anything else is a
/// separator, as in `Nhận tiền - 500.000 VND`.
fn is_sign(text: &str, sign: &Match<'_>) -> bool {
    let touches = text[sign.end()..]
        .chars()
        .next()
        .is_some_and(|c| !c.is_whitespace());
    let line_start = line_at(text, sign.start()).start;
    touches || text[line_start..sign.start()].trim().is_empty()
}

// ── Amount ───────────────────────────────────────────────────────────────────

const SIGN: &str = r"([+\-−–])?";
const NUMBER: &str = r"(\d[\d.,]*\d|\d)";

re!(
    re_currency_suffix,
    &format!(r"{SIGN}\s*{NUMBER}\s*(?:(?i:vnđ|vnd|usd|eur|gbp|jpy|đồng|dong|đ)\b|₫)")
);
re!(
    re_currency_prefix,
    &format!(r"{SIGN}\s*(?:[$€£¥₫]|(?i:vnd|usd|eur|gbp)\s)\s*{NUMBER}")
);
re!(
    re_amount_labelled,
    &format!(r"(?i)\b(?:amount|số\s*tiền|so\s*tien|total|tổng\s*tiền|tổng|tong\s*tien|giá\s*trị|gia\s*tri)\b\s*[:\-]?\s*{SIGN}\s*{NUMBER}")
);
re!(
    re_signed_grouped,
    r"([+\-−–])\s?(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?)\b"
);
re!(
    re_grouped,
    r"()\b(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?)\b"
);
re!(
    re_balance_keyword,
    r"(?i)\b(?:số\s*dư|so\s*du|balance|bal|sd|available)\b"
);

/// Shared tail of every amount rule: group 1 is the sign, group 2 the number.
fn amount_candidate(text: &str, ctx: &RuleContext<'_>, caps: &Captures<'_>) -> Option<Decimal> {
    let number = caps.get(2)?;
    let line = &text[line_at(text, number.start())];
    if re_balance_keyword().is_match(line) {
        return None;
    }
    let sign = caps.get(1).filter(|m| !m.is_empty());
    if let Some(s) = sign {
        let before = text[..s.start()].chars().next_back();
        if before.is_some_and(char::is_alphanumeric) {
            return None;
        }
    }
    let sign = sign.filter(|s| is_sign(text, s));
    let value = normalize_amount(number.as_str(), ctx.locale)?;
    if value.is_zero() {
        return None;
    }
    let negative = explicit_sign(sign.map(|m| m.as_str()))
        .or_else(|| keyword_sign(line))
        .unwrap_or(false);
    Some(if negative { -value } else { value })
}

fn amount_rule(
    re: fn() -> &'static regex::Regex,
    text: &str,
    ctx: &RuleContext<'_>,
) -> Option<Matched<Decimal>> {
    scan(re(), 2, text, ctx, |caps| amount_candidate(text, ctx, caps))
}

pub const AMOUNT_RULES: &[FieldRule<Decimal>] = &[
    FieldRule {
        name: "currency_suffix",
        apply: |text, ctx| amount_rule(re_currency_suffix, text, ctx),
    },
    FieldRule {
        name: "currency_prefix",
        apply: |text, ctx| amount_rule(re_currency_prefix, text, ctx),
    },
    FieldRule {
        name: "labelled",
        apply: |text, ctx| amount_rule(re_amount_labelled, text, ctx),
    },
    FieldRule {
        name: "signed_grouped",
        apply: |text, ctx| amount_rule(re_signed_grouped, text, ctx),
    },
    FieldRule {
        name: "grouped",
        apply: |text, ctx| amount_rule(re_grouped, text, ctx),
    },
];

// ── Balance ──────────────────────────────────────────────────────────────────

re!(
    re_balance_labelled,
    &format!(r"(?i)\b(?:số\s*dư(?:\s*(?:khả\s*dụng|cuối|sau\s*giao\s*dịch))?|so\s*du|(?:available\s+|account\s+|new\s+)?balance|bal|sd)\b\.?\s*[:\-]?\s*(?:[$€£¥₫]|(?:vnd|usd)\s)?\s*{SIGN}\s*{NUMBER}")
);

pub const BALANCE_RULES: &[FieldRule<Decimal>] = &[FieldRule {
    name: "labelled",
    apply: |text, ctx| {
        scan(re_balance_labelled(), 2, text, ctx, |caps| {
            let value = normalize_amount(caps.get(2)?.as_str(), ctx.locale)?;
            let sign = caps.get(1).filter(|m| is_sign(text, m));
            let negative = explicit_sign(sign.map(|m| m.as_str())).unwrap_or(false);
            Some(if negative { -value } else { value })
        })
    },
}];
