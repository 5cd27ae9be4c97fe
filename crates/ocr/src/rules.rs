use chrono::NaiveDate;
use regex::{Captures, Regex};
use snap_core::AmountLocale;
use std::ops::Range;

/// A field value together with the byte span of `text` it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Matched<T> {
    pub value: T,
    pub span: Range<usize>,
}

/// State shared by every rule during one parse.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub locale: AmountLocale,
    /// Spans already claimed by earlier fields.
    pub consumed: &'a [Range<usize>],
}

impl<'a> RuleContext<'a> {
    pub fn new(locale: AmountLocale, consumed: &'a [Range<usize>]) -> Self {
        Self { locale, consumed }
    }

    pub fn is_free(&self, span: &Range<usize>) -> bool {
        !self
            .consumed
            .iter()
            .any(|c| c.start < span.end && span.start < c.end)
    }
}

/// One named extraction strategy for a field. Rules for a field are tried in
/// order and the first one producing a value wins.
pub struct FieldRule<T> {
    pub name: &'static str,
    pub apply: fn(&str, &RuleContext<'_>) -> Option<Matched<T>>,
}

/// Runs `rules` in order, returning the winning rule's name and match.
pub fn first_match<T>(
    rules: &[FieldRule<T>],
    text: &str,
    ctx: &RuleContext<'_>,
) -> Option<(&'static str, Matched<T>)> {
    rules
        .iter()
        .find_map(|rule| (rule.apply)(text, ctx).map(|m| (rule.name, m)))
}

/// Leftmost candidate of `re` whose `group` span is free and which `convert`
/// accepts.
pub(crate) fn scan<T>(
    re: &Regex,
    group: usize,
    text: &str,
    ctx: &RuleContext<'_>,
    convert: impl Fn(&Captures<'_>) -> Option<T>,
) -> Option<Matched<T>> {
    re.captures_iter(text).find_map(|caps| {
        let span = caps.get(group)?.range();
        if !ctx.is_free(&span) {
            return None;
        }
        convert(&caps).map(|value| Matched { value, span })
    })
}

/// Byte range of the line containing `pos`, without the line terminator.
pub(crate) fn line_at(text: &str, pos: usize) -> Range<usize> {
    let start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
    start..end
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

// ── Date ─────────────────────────────────────────────────────────────────────

re!(
    re_day_month_year,
    r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b"
);
re!(re_iso, r"\b(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})\b");
re!(
    re_vietnamese_long,
    r"(?i)ngày\s+(\d{1,2})\s+tháng\s+(\d{1,2})\s+năm\s+(\d{4})"
);
re!(
    re_day_month_name,
    r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
);
re!(
    re_month_name_day,
    r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
);
re!(re_short_year, r"\b(\d{1,2})[/\-](\d{1,2})[/\-](\d{2})\b");

/// Two-digit years below 50 are 20xx, the rest 19xx.
fn expand_year(yy: i32) -> i32 {
    if yy < 50 {
        2000 + yy
    } else {
        1900 + yy
    }
}

fn month_number(name: &str) -> Option<u32> {
    let m = match name.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

pub const DATE_RULES: &[FieldRule<NaiveDate>] = &[
    FieldRule {
        name: "day_month_year",
        apply: |text, ctx| {
            scan(re_day_month_year(), 0, text, ctx, |c| {
                ymd(num(c, 3)?, num(c, 2)?, num(c, 1)?)
            })
        },
    },
    FieldRule {
        name: "iso",
        apply: |text, ctx| {
            scan(re_iso(), 0, text, ctx, |c| ymd(num(c, 1)?, num(c, 2)?, num(c, 3)?))
        },
    },
    FieldRule {
        name: "vietnamese_long",
        apply: |text, ctx| {
            scan(re_vietnamese_long(), 0, text, ctx, |c| {
                ymd(num(c, 3)?, num(c, 2)?, num(c, 1)?)
            })
        },
    },
    FieldRule {
        name: "day_month_name",
        apply: |text, ctx| {
            scan(re_day_month_name(), 0, text, ctx, |c| {
                ymd(num(c, 3)?, month_number(c.get(2)?.as_str())?, num(c, 1)?)
            })
        },
    },
    FieldRule {
        name: "month_name_day",
        apply: |text, ctx| {
            scan(re_month_name_day(), 0, text, ctx, |c| {
                ymd(num(c, 3)?, month_number(c.get(1)?.as_str())?, num(c, 2)?)
            })
        },
    },
    FieldRule {
        name: "day_month_short_year",
        apply: |text, ctx| {
            scan(re_short_year(), 0, text, ctx, |c| {
                ymd(expand_year(num(c, 3)?), num(c, 2)?, num(c, 1)?)
            })
        },
    },
];

// ── Reference ────────────────────────────────────────────────────────────────

re!(
    re_reference_labelled,
    r"(?i)\b(?:ref(?:erence)?(?:\s*(?:no|number|code))?|transaction\s*(?:id|no|code|number)|trans\s*id|txn\s*id|mã\s*giao\s*dịch|ma\s*giao\s*dich|mã\s*gd|ma\s*gd|số\s*tham\s*chiếu|so\s*tham\s*chieu|số\s*bút\s*toán|so\s*but\s*toan|atm|id)\b\.?\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9\-]{3,})"
);
re!(re_fund_transfer, r"\b(FT[A-Z0-9]{8,})\b");
re!(re_bare_code, r"\b([A-Z0-9]{8,24})\b");

fn clean_reference(raw: &str) -> Option<String> {
    let code = raw.trim_end_matches('-');
    (code.len() >= 4 && code.chars().any(|c| c.is_ascii_digit())).then(|| code.to_string())
}

pub const REFERENCE_RULES: &[FieldRule<String>] = &[
    FieldRule {
        name: "labelled",
        apply: |text, ctx| {
            scan(re_reference_labelled(), 1, text, ctx, |c| {
                clean_reference(c.get(1)?.as_str())
            })
        },
    },
    FieldRule {
        name: "fund_transfer",
        apply: |text, ctx| {
            scan(re_fund_transfer(), 1, text, ctx, |c| {
                clean_reference(c.get(1)?.as_str())
            })
        },
    },
    FieldRule {
        name: "bare_code",
        apply: |text, ctx| {
            scan(re_bare_code(), 1, text, ctx, |c| {
                let code = c.get(1)?.as_str();
                let has_letter = code.chars().any(|ch| ch.is_ascii_uppercase());
                let has_digit = code.chars().any(|ch| ch.is_ascii_digit());
                // `1500000VND`: an amount whose space the OCR dropped.
                let letters = code.trim_start_matches(|ch: char| ch.is_ascii_digit());
                let glued_amount =
                    letters.len() <= 3 && letters.chars().all(|ch| ch.is_ascii_uppercase());
                (has_letter && has_digit && !glued_amount).then(|| code.to_string())
            })
        },
    },
];

// ── Account ──────────────────────────────────────────────────────────────────

re!(
    re_masked_account,
    r"(?:\d{4}[ \-]?)?(?:[*xX•]{2,}[ \-]?)+(\d{3,6})\b"
);
re!(
    re_account_labelled,
    r"(?i)\b(?:account(?:\s*(?:no|number))?|acct|a/c|tài\s*khoản(?:\s*(?:nguồn|nhận|đích))?|tai\s*khoan|số\s*tk|so\s*tk|stk|tk)\b\.?\s*[:#]?\s*(\d{3,20}(?:[ \-]\d{3,4})*)"
);

/// End of the account number that starts at `start`, given a regex match that
/// may run into the next number on the line. Stops before a digit group that
/// continues as a longer or separator-grouped number (`1.500.000`).
fn account_end(text: &str, start: usize, end: usize) -> usize {
    let mut kept = start;
    let mut pos = start;
    for (i, group) in text[start..end].split([' ', '-']).enumerate() {
        let group_end = pos + group.len();
        let mut after = text[group_end..].chars();
        let continues = match (after.next(), after.next()) {
            (Some(c), _) if c.is_ascii_digit() => true,
            (Some('.' | ','), Some(d)) => d.is_ascii_digit(),
            _ => false,
        };
        if continues || (i > 0 && !(3..=4).contains(&group.len())) {
            break;
        }
        kept = group_end;
        pos = group_end + 1;
    }
    kept
}

/// Only the last four digits of an account number are ever kept.
fn mask_account(digits: &str) -> String {
    let tail = &digits[digits.len().saturating_sub(4)..];
    format!("****{tail}")
}

pub const ACCOUNT_RULES: &[FieldRule<String>] = &[
    FieldRule {
        name: "masked",
        apply: |text, ctx| {
            scan(re_masked_account(), 0, text, ctx, |c| {
                let whole = c.get(0)?;
                let preceded_by_word = text[..whole.start()]
                    .chars()
                    .next_back()
                    .is_some_and(char::is_alphanumeric);
                if preceded_by_word {
                    return None;
                }
                Some(mask_account(c.get(1)?.as_str()))
            })
        },
    },
    FieldRule {
        name: "labelled",
        apply: |text, ctx| {
            re_account_labelled().captures_iter(text).find_map(|c| {
                let m = c.get(1)?;
                let span = m.start()..account_end(text, m.start(), m.end());
                let digits: String = text[span.clone()]
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect();
                if !ctx.is_free(&span) || !(4..=20).contains(&digits.len()) {
                    return None;
                }
                Some(Matched {
                    value: mask_account(&digits),
                    span,
                })
            })
        },
    },
];

// ── Description ──────────────────────────────────────────────────────────────

re!(
    re_description_labelled,
    r"(?im)^[ \t]*(?:mô\s*tả|mo\s*ta|nội\s*dung(?:\s*(?:chuyển\s*khoản|giao\s*dịch|ck))?|noi\s*dung(?:\s*ck)?|lời\s*nhắn|loi\s*nhan|description|desc|remarks?|memo|notes?|content)\b[ \t]*[:\-]?[ \t]*(\S[^\n]*?)[ \t]*$"
);

/// Lines that appear on most receipts and never describe the transaction.
const BOILERPLATE: &[&str] = &[
    "chuyển tiền thành công",
    "chuyen tien thanh cong",
    "giao dịch thành công",
    "giao dich thanh cong",
    "chuyển khoản thành công",
    "thanh toán thành công",
    "transfer successful",
    "transaction successful",
    "payment successful",
    "successful",
    "thành công",
    "chi tiết giao dịch",
    "transaction details",
    "số tiền",
    "amount",
    "nội dung",
    "description",
    "ngày giao dịch",
    "thời gian",
    "mã giao dịch",
    "tài khoản nguồn",
    "tài khoản nhận",
    "người nhận",
    "ngân hàng nhận",
    "phí giao dịch",
    "miễn phí",
    "free",
    "transaction date",
    "reference",
    "recipient",
    "share",
    "chia sẻ",
    "lưu ảnh",
    "save image",
    "done",
    "hoàn tất",
    "đóng",
    "close",
];

fn is_boilerplate(line: &str) -> bool {
    let normalized = line
        .trim()
        .trim_end_matches(|c: char| c == ':' || c == '!' || c == '.')
        .trim()
        .to_lowercase();
    BOILERPLATE.contains(&normalized.as_str())
}

fn is_texty(line: &str) -> bool {
    let visible: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.len() < 5 {
        return false;
    }
    let letters = visible.iter().filter(|c| c.is_alphabetic()).count();
    letters * 5 >= visible.len() * 3
}

pub const DESCRIPTION_RULES: &[FieldRule<String>] = &[
    FieldRule {
        name: "labelled",
        apply: |text, ctx| {
            scan(re_description_labelled(), 1, text, ctx, |c| {
                let value = c.get(1)?.as_str().trim();
                (value.chars().count() > 3).then(|| value.to_string())
            })
        },
    },
    FieldRule {
        name: "longest_text_line",
        apply: |text, ctx| {
            let mut best: Option<Matched<String>> = None;
            let mut offset = 0;
            for line in text.split('\n') {
                let start = offset;
                offset += line.len() + 1;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let lead = line.len() - line.trim_start().len();
                let span = start + lead..start + lead + trimmed.len();
                if !ctx.is_free(&(start..start + line.len()))
                    || is_boilerplate(trimmed)
                    || !is_texty(trimmed)
                {
                    continue;
                }
                let longer = best
                    .as_ref()
                    .map_or(true, |b| trimmed.chars().count() > b.value.chars().count());
                if longer {
                    best = Some(Matched {
                        value: trimmed.to_string(),
                        span,
                    });
                }
            }
            best
        },
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn run<T>(rules: &[FieldRule<T>], text: &str) -> Option<(&'static str, T)> {
        let ctx = RuleContext::new(AmountLocale::default(), &[]);
        first_match(rules, text, &ctx).map(|(name, m)| (name, m.value))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_in_every_supported_shape() {
        let cases = [
            ("Ngày: 15/03/2024 10:45", date(2024, 3, 15), "day_month_year"),
            ("15-03-2024", date(2024, 3, 15), "day_month_year"),
            ("25.11.2022", date(2022, 11, 25), "day_month_year"),
            ("Date 2024-03-15", date(2024, 3, 15), "iso"),
            ("Ngày 5 tháng 3 năm 2024", date(2024, 3, 5), "vietnamese_long"),
            ("15 Mar 2024", date(2024, 3, 15), "day_month_name"),
            ("1st January 2024", date(2024, 1, 1), "day_month_name"),
            ("March 15, 2024", date(2024, 3, 15), "month_name_day"),
            ("15/03/24", date(2024, 3, 15), "day_month_short_year"),
            ("01-12-98", date(1998, 12, 1), "day_month_short_year"),
        ];
        for (text, expected, rule) in cases {
            assert_eq!(run(DATE_RULES, text), Some((rule, expected)), "{text}");
        }
    }

    #[test]
    fn leftmost_of_two_valid_dates_wins() {
        assert_eq!(
            run(DATE_RULES, "01/03/2024 then 15/03/2024"),
            Some(("day_month_year", date(2024, 3, 1)))
        );
    }

    #[test]
    fn rule_order_beats_reading_order_across_formats() {
        // `day_month_year` is tried before `iso`, wherever the ISO date sits.
        assert_eq!(
            run(DATE_RULES, "2024-03-10 posted, value date 15/03/2024"),
            Some(("day_month_year", date(2024, 3, 15)))
        );
        assert_eq!(
            run(DATE_RULES, "2024-03-10 posted"),
            Some(("iso", date(2024, 3, 10)))
        );
    }

    #[test]
    fn impossible_dates_are_skipped() {
        assert_eq!(run(DATE_RULES, "32/13/2024"), None);
        assert_eq!(run(DATE_RULES, "30/02/2024"), None);
        // Leftmost valid candidate wins within a rule.
        assert_eq!(
            run(DATE_RULES, "31/02/2024 then 01/03/2024"),
            Some(("day_month_year", date(2024, 3, 1)))
        );
    }

    #[test]
    fn consumed_spans_are_not_reused() {
        let text = "15/03/2024";
        let consumed = [0..10];
        let ctx = RuleContext::new(AmountLocale::default(), &consumed);
        assert!(first_match(DATE_RULES, text, &ctx).is_none());
    }

    #[test]
    fn references_prefer_labels() {
        assert_eq!(
            run(REFERENCE_RULES, "Reference: TXN123456789"),
            Some(("labelled", "TXN123456789".to_string()))
        );
        assert_eq!(
            run(REFERENCE_RULES, "Mã giao dịch: FT24075ABC12"),
            Some(("labelled", "FT24075ABC12".to_string()))
        );
        assert_eq!(
            run(REFERENCE_RULES, "Chuyen tien FT24075123456 thanh cong"),
            Some(("fund_transfer", "FT24075123456".to_string()))
        );
        assert_eq!(
            run(REFERENCE_RULES, "code AB12CD34EF"),
            Some(("bare_code", "AB12CD34EF".to_string()))
        );
    }

    #[test]
    fn reference_after_atm_label() {
        assert_eq!(
            run(REFERENCE_RULES, "ATM: ATM987654321"),
            Some(("labelled", "ATM987654321".to_string()))
        );
    }

    #[test]
    fn amount_with_dropped_space_is_not_a_reference() {
        assert_eq!(run(REFERENCE_RULES, "1500000VND"), None);
    }

    #[test]
    fn reference_needs_a_digit() {
        assert_eq!(run(REFERENCE_RULES, "Reference: PENDING"), None);
        assert_eq!(run(REFERENCE_RULES, "TRANSFERRED"), None);
    }

    #[test]
    fn accounts_are_masked_to_last_four() {
        assert_eq!(
            run(ACCOUNT_RULES, "From ****1234"),
            Some(("masked", "****1234".to_string()))
        );
        assert_eq!(
            run(ACCOUNT_RULES, "Card 4111 **** **** 9876"),
            Some(("masked", "****9876".to_string()))
        );
        assert_eq!(
            run(ACCOUNT_RULES, "Tài khoản nguồn: 0123456789"),
            Some(("labelled", "****6789".to_string()))
        );
        assert_eq!(
            run(ACCOUNT_RULES, "Account No: 1903 4567 8901"),
            Some(("labelled", "****8901".to_string()))
        );
    }

    #[test]
    fn labelled_account_stops_before_amount_on_same_line() {
        assert_eq!(
            run(ACCOUNT_RULES, "Tài khoản: 0123456789 1.500.000 VND"),
            Some(("labelled", "****6789".to_string()))
        );
        assert_eq!(
            run(ACCOUNT_RULES, "Tài khoản 0123456789 500.000 VND"),
            Some(("labelled", "****6789".to_string()))
        );
        assert_eq!(
            run(ACCOUNT_RULES, "STK 0123456789 1500000"),
            Some(("labelled", "****6789".to_string()))
        );
    }

    #[test]
    fn account_label_without_digits_is_ignored() {
        assert_eq!(run(ACCOUNT_RULES, "Account: Nguyen Van A"), None);
    }

    #[test]
    fn labelled_description() {
        assert_eq!(
            run(
                DESCRIPTION_RULES,
                "Description: Transfer to John Doe\nAmount: 500000 VND"
            ),
            Some(("labelled", "Transfer to John Doe".to_string()))
        );
        assert_eq!(
            run(DESCRIPTION_RULES, "Nội dung: Chuyen tien an trua"),
            Some(("labelled", "Chuyen tien an trua".to_string()))
        );
    }

    #[test]
    fn longest_line_skips_boilerplate_and_numbers() {
        let text = "Chuyển tiền thành công\n1.500.000 VND\nThanh toan hoa don dien\nPhí";
        assert_eq!(
            run(DESCRIPTION_RULES, text),
            Some(("longest_text_line", "Thanh toan hoa don dien".to_string()))
        );
    }

    #[test]
    fn longest_line_skips_lines_holding_other_fields() {
        let text = "Paid to Grab Vietnam 15/03/2024\nCoffee beans";
        let consumed = [21..31];
        let ctx = RuleContext::new(AmountLocale::default(), &consumed);
        let (_, m) = first_match(DESCRIPTION_RULES, text, &ctx).unwrap();
        assert_eq!(m.value, "Coffee beans");
        assert_eq!(&text[m.span], "Coffee beans");
    }

    #[test]
    fn line_at_finds_enclosing_line() {
        let text = "one\ntwo three\nfour";
        assert_eq!(&text[line_at(text, 6)], "two three");
        assert_eq!(&text[line_at(text, 0)], "one");
        assert_eq!(&text[line_at(text, text.len() - 1)], "four");
    }
}
