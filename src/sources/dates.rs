use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static DAY_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b").unwrap());

static LONG_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})º?\s+de\s+(\p{L}+)\s+de\s+(\d{4})\b").unwrap()
});

static YEAR_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b").unwrap());

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "março" | "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(month)
}

fn number(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Finds the earliest valid date in Brazilian notation
///
/// Recognizes `dd/mm/yyyy` (also with `-` or `.`), `yyyy-mm-dd`, and
/// `dd de <mês> de yyyy`. Impossible dates such as `31/02/2024` are skipped.
///
/// ```
/// use chrono::NaiveDate;
/// use juris_harvest::sources::extract_date;
///
/// assert_eq!(
///     extract_date("Julgado em 5 de março de 2024."),
///     NaiveDate::from_ymd_opt(2024, 3, 5)
/// );
/// ```
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let ymd = |y: &str, m: &str, d: &str| -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y.parse().ok()?, number(m)?, number(d)?)
    };
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in DAY_FIRST.captures_iter(text) {
        if let Some(date) = ymd(&caps[3], &caps[2], &caps[1]) {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in LONG_FORM.captures_iter(text) {
        let date = month_number(&caps[2]).and_then(|month| {
            NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, number(&caps[1])?)
        });
        if let Some(date) = date {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in YEAR_FIRST.captures_iter(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    found.into_iter().min_by_key(|(pos, _)| *pos).map(|(_, d)| d)
}
