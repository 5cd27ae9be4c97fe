use regex::Regex;
use snap_core::CategoryConfig;

/// Built-in keyword table. Earlier entries win, so narrow categories sit above
/// the catch-all `Transfer`.
const BUILTIN: &[(&str, &[&str])] = &[
    ("Salary", &["lương", "luong", "salary", "payroll", "wage", "wages"]),
    (
        "Cash",
        &["rút tiền", "rut tien", "atm", "cash withdrawal", "withdrawal"],
    ),
    (
        "Bills & Utilities",
        &[
            "hóa đơn", "hoa don", "tiền điện", "tien dien", "tiền nước", "tien nuoc",
            "electricity", "water bill", "internet", "evn", "vnpt", "viettel", "bill",
        ],
    ),
    (
        "Food & Drink",
        &[
            "ăn uống", "an uong", "ăn trưa", "an trua", "ăn tối", "an toi", "cà phê", "ca phe",
            "cafe", "coffee", "nhà hàng", "nha hang", "restaurant", "grabfood", "shopeefood",
            "starbucks", "highlands", "phở", "pho",
        ],
    ),
    (
        "Transport",
        &["grab", "gojek", "taxi", "xăng", "xang", "petrol", "fuel", "parking", "gửi xe", "gui xe"],
    ),
    (
        "Shopping",
        &[
            "shopee", "lazada", "tiki", "mua sắm", "mua sam", "siêu thị", "sieu thi",
            "supermarket", "mall", "store",
        ],
    ),
    (
        "Transfer",
        &["chuyển khoản", "chuyen khoan", "chuyển tiền", "chuyen tien", "transfer", "ck"],
    ),
];

struct CompiledCategory {
    name: String,
    pattern: Regex,
}

/// Keyword lookup from description text to a category name.
pub struct CategoryTable {
    entries: Vec<CompiledCategory>,
}

impl CategoryTable {
    /// User-supplied categories first, then the built-in table.
    pub fn new(extra: &[CategoryConfig]) -> Self {
        let user = extra
            .iter()
            .map(|c| (c.category.as_str(), c.keywords.iter().map(String::as_str).collect()));
        let builtin = BUILTIN
            .iter()
            .map(|(name, keywords)| (*name, keywords.to_vec()));
        let entries = user
            .chain(builtin)
            .filter_map(|(name, keywords): (&str, Vec<&str>)| {
                let pattern = keyword_pattern(&keywords)?;
                Some(CompiledCategory {
                    name: name.to_string(),
                    pattern,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(&[])
    }

    pub fn classify(&self, description: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.pattern.is_match(description))
            .map(|e| e.name.as_str())
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One case-insensitive alternation of whole-word keywords; inner whitespace
/// matches any run of whitespace.
fn keyword_pattern(keywords: &[&str]) -> Option<Regex> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .filter(|k| !k.is_empty())
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}
