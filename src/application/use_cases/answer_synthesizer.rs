use serde_json::Value;

use crate::domain::analysis::NumericSummary;
use crate::domain::listing::Row;
use crate::domain::llm_config::ChatMessage;

pub const DEFAULT_SAMPLE_ROWS: usize = 80;
pub const DEFAULT_RECOMMENDATIONS: usize = 3;

/// Column the summary statistics are computed over.
const PRICE_COLUMN: &str = "price";

/// Messages for the rows-to-answer call plus the summary they embed.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub messages: Vec<ChatMessage>,
    pub summary: NumericSummary,
}

pub struct AnswerSynthesizer {
    sample_rows: usize,
    recommendations: usize,
}

impl Default for AnswerSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_ROWS, DEFAULT_RECOMMENDATIONS)
    }
}

impl AnswerSynthesizer {
    pub fn new(sample_rows: usize, recommendations: usize) -> Self {
        Self {
            sample_rows,
            recommendations,
        }
    }

    /// Rows sent to the model. Independent of the statement's own LIMIT.
    pub fn sample<'a>(&self, rows: &'a [Row]) -> &'a [Row] {
        &rows[..rows.len().min(self.sample_rows)]
    }

    pub fn build_request(&self, question: &str, rows: &[Row]) -> AnswerRequest {
        let sample = self.sample(rows);
        let summary = summarize(sample);

        let summary_json = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
        let rows_json = serde_json::to_string(sample).unwrap_or_else(|_| "[]".to_string());
        let n = self.recommendations;

        let system = format!(
            "บทบาทของคุณ: ผู้ช่วยฝ่ายขายอสังหาริมทรัพย์ (ภาษาไทยเท่านั้น).\n\
             • ใช้ข้อมูลเฉพาะใน 'rows' เท่านั้น ห้ามเดา\n\
             • ถ้าข้อมูลไม่พอ ให้บอกว่า 'ไม่มีข้อมูลเพียงพอ'\n\
             • ตอบกระชับ ใช้บูลเล็ตเมื่อเหมาะสม\n\
             • แสดงจำนวนที่พบ และสรุปราคา (min/max/avg) ถ้ามี\n\
             • เสนอ Top {n} ที่ตรงที่สุด พร้อมเหตุผลสั้น ๆ (พิจารณา type/location/price/size/bedrooms/bathrooms/available_from)\n\
             • หากมีน้อยกว่า {n} ให้แสดงเท่าที่มี\n\
             • หลีกเลี่ยงถ้อยคำเกินจริง และอย่ากล่าวอ้างสิ่งที่ไม่มีใน rows\n"
        );

        let mut user = format!(
            "คำถามของลูกค้า:\n{question}\n\n\
             สรุปตัวเลขที่คำนวณให้แล้ว:\n{summary_json}\n\n\
             ข้อมูลทรัพย์ (สูงสุด {} แถว):\n```json\n{rows_json}\n```\n\n",
            self.sample_rows
        );
        if sample.is_empty() {
            user.push_str("หมายเหตุ: ไม่พบข้อมูลที่ตรงกับคำถาม ให้ตอบว่า 'ไม่มีข้อมูลเพียงพอ'\n\n");
        }
        user.push_str(&format!(
            "รูปแบบคำตอบที่ต้องการ:\n\
             1) สรุปภาพรวม\n\
             2) Top {n} ที่แนะนำ (price, location, type, size, bedrooms, bathrooms, available_from + เหตุผลย่อ)\n\
             3) ข้อสังเกต/ข้อจำกัด (ถ้ามี)\n"
        ));

        AnswerRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            summary,
        }
    }
}

/// Count of `rows`, plus min/max/mean of every finite numeric price.
/// The mean is rounded to two decimals.
pub fn summarize(rows: &[Row]) -> NumericSummary {
    let prices: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(PRICE_COLUMN).and_then(Value::as_f64))
        .filter(|price| price.is_finite())
        .collect();

    if prices.is_empty() {
        return NumericSummary {
            count: rows.len(),
            min_price: None,
            max_price: None,
            avg_price: None,
        };
    }

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Incremental mean; a plain sum overflows for huge prices.
    let mean = prices
        .iter()
        .enumerate()
        .fold(0.0, |acc, (i, price)| acc + (price - acc) / (i + 1) as f64);
    let rounded = (mean * 100.0).round() / 100.0;

    NumericSummary {
        count: rows.len(),
        min_price: Some(min),
        max_price: Some(max),
        avg_price: [rounded, mean].into_iter().find(|v| v.is_finite()),
    }
}
