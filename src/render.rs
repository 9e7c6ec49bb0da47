//! Chat text for records and replies.
use crate::audit::mask_tail4;
use crate::registry::Tenant;
use crate::table::{Record, RecordField};
use regex::Regex;
use std::sync::OnceLock;

/// A record picked by navigation plus its position for the footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView {
    pub record: Record,
    /// 0-based.
    pub index: usize,
    pub total: usize,
}

impl RecordView {
    pub fn position_label(&self) -> String {
        format!(
            "➡️ {}/{} — /next yoki /prev, yoki istalgan raqamni yozing (masalan: 15)",
            self.index + 1,
            self.total
        )
    }
}

pub const NOT_ADMIN: &str = "❌ Siz admin emassiz.";
pub const ACCESS_DENIED: &str = "❌ Sizga ruxsat berilmagan.";
pub const EMPTY_TABLE: &str = "❌ Jadvalda yozuv yo‘q.";
pub const NO_DATA: &str = "❌ Ma’lumot topilmadi.";

pub fn greeting(total: usize) -> String {
    format!(
        "✅ Bot ishga tushdi. {total} ta yozuv tayyor.\nOldinga: /next\nOrqaga: /prev\nIstalgan raqamni yozing (masalan: 22)"
    )
}

pub fn out_of_range(min: u64, max: u64) -> String {
    format!("❌ Noto‘g‘ri raqam. {min} dan {max} gacha bo‘lishi kerak.")
}

pub fn usage(command: &str) -> String {
    format!("❗ Foydalanish: /{command} <id>")
}

pub fn toggle_ack(target: &str, enabled: bool, known: bool) -> String {
    let verb = if enabled { "yoqildi" } else { "o‘chirildi" };
    if known {
        format!("✅ {target} {verb}.")
    } else {
        format!("✅ {target} {verb} (hali ro‘yxatda yo‘q).")
    }
}

pub fn stats_report(tenants: &[Tenant]) -> String {
    if tenants.is_empty() {
        return "📊 Foydalanuvchilar yo‘q.".to_string();
    }
    let mut out = String::from("📊 Faollik:");
    for tenant in tenants {
        let state = if tenant.enabled { "✅" } else { "⛔" };
        out.push_str(&format!(
            "\n{state} {} | {} | {}",
            mask_tail4(tenant.identity.as_str()),
            tenant.sheet,
            tenant.activity
        ));
    }
    out
}

/// The notice, the debtor's phone, and the position footer, one message each.
pub fn record_messages(view: &RecordView, contact_phone: &str) -> Vec<String> {
    let record = &view.record;
    let full_name = record.field(RecordField::FullName);
    let phone = record.field(RecordField::Phone);
    let days = record.field(RecordField::DaysOverdue);
    let amount = format_amount(record.field(RecordField::TotalDebt));

    let notice = format!(
        "Фуқаро {full_name}.\n\
СИЗ томонингиздан \"Uzum Nasiya\" платформаси орқали электрон расмийлаштирилган шартнома бўйича {amount} сўм миқдорида {days} кунлик муддати ўтган қарздорлигингиз мавжуд.\n\
Қарздорлик суммасини мажбурий ундирув тартибда ундирув ишлари амалга оширилади.\n\
Жумладан, МИБ томонидан ойлик иш ҳақига қаратилади, руйхатда турган уй-жойингиздаги мол-мулк хатланади ҳамда ЙҲҲБ (ГАИ) томонидан шахсий автомашинангиз жарима майдончасига жойлаштирилади, шунингдек Ўзбекистон Республикасидан чиқиш ҳуқуқингиз чекланиши ҳақида огоҳлантирамиз.\n\
Маълумот учун +{contact_phone} рақамига қўнғироқ қилиш тавсия этилади.\n\
ЗУДЛИК БИЛАН ҚАРЗДОРЛИКНИ ТЎЛАНГ!"
    );
    vec![
        notice,
        format!("📱 Фойдаланувчи рақами: +{phone}"),
        view.position_label(),
    ]
}

fn non_numeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9.,]").expect("valid non-numeric regex"))
}

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+\.?\d*|\.\d+)").expect("valid leading number regex"))
}

/// Format a debt amount with `ru-RU` conventions: non-breaking-space digit
/// groups, decimal comma, at most three fraction digits.
///
/// Currency symbols and spaces are stripped first; the first comma counts as
/// the decimal point. Text with no number in it is returned as-is.
pub fn format_amount(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let cleaned = non_numeric().replace_all(raw, "").replacen(',', ".", 1);
    let Some(number) = leading_number()
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
    else {
        return raw.to_string();
    };

    let fixed = format!("{:.3}", (number * 1000.0).round() / 1000.0);
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 * 2);
    for (idx, digit) in digits.iter().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('\u{a0}');
        }
        grouped.push(*digit);
    }
    if frac_part.is_empty() {
        grouped
    } else {
        format!("{grouped},{frac_part}")
    }
}
