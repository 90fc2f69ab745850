// Display strings for wei amounts.

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// `"1.2500 ETH"`. Truncates to four decimals.
pub(crate) fn ether_value_string(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = (wei % WEI_PER_ETHER) / (WEI_PER_ETHER / 10_000);
    format!("{whole}.{frac:04} ETH")
}

pub(crate) fn fiat_value(wei: u128, rate: f64) -> f64 {
    // f64 keeps ~15 significant digits; plenty for a display value.
    (wei as f64 / WEI_PER_ETHER as f64) * rate
}

fn currency_symbol(code: &str) -> &'static str {
    match code {
        "USD" | "CAD" | "AUD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        _ => "",
    }
}

fn group_thousands(whole: u128) -> String {
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `"$1,234.56 USD"`.
pub(crate) fn fiat_value_string_with_code(wei: u128, rate: f64, code: &str) -> String {
    let cents = (fiat_value(wei, rate) * 100.0).round();
    let cents = if cents.is_finite() && cents > 0.0 {
        cents as u128
    } else {
        0
    };
    format!(
        "{}{}.{:02} {code}",
        currency_symbol(code),
        group_thousands(cents / 100),
        cents % 100
    )
}
