//! Text-to-SQL prompt for the listings table.
//!
//! The model is asked for a single `SELECT *` statement with one LIMIT and
//! no comments or trailing `;`. The guard does not depend on the model
//! honouring this.

use crate::domain::llm_config::ChatMessage;

/// A question/statement pair replayed to the model before the real question.
#[derive(Debug, Clone)]
pub struct FewShotExample {
    pub question: &'static str,
    pub sql: &'static str,
}

/// Column, SQLite type and a short Thai gloss.
const LISTING_COLUMNS: &[(&str, &str, &str)] = &[
    ("id", "INTEGER", "PRIMARY KEY"),
    ("price", "REAL", "ราคา"),
    ("description", "TEXT", "คำอธิบาย"),
    ("location", "TEXT", "ทำเล"),
    ("type", "TEXT", "apartment/villa/studio/duplex"),
    ("size", "REAL", "พื้นที่ ตร.ม."),
    ("bedrooms", "INTEGER", "จำนวนห้องนอน"),
    ("bathrooms", "INTEGER", "จำนวนห้องน้ำ"),
    ("available_from", "TEXT", "วันที่พร้อมเข้าอยู่ YYYY-MM-DD"),
    ("available_year", "INTEGER", "ปีที่พร้อมเข้าอยู่"),
    ("available_month", "INTEGER", "เดือนที่พร้อมเข้าอยู่"),
    ("available_day", "INTEGER", "วันที่พร้อมเข้าอยู่"),
];

pub const DEFAULT_EXAMPLES: &[FewShotExample] = &[
    FewShotExample {
        question: "แสดงรายการที่ราคาต่ำกว่า 2,000,000 และขนาดใหญ่กว่าค่าเฉลี่ยในกลุ่มราคานี้ จำกัด 50 แถว",
        sql: "SELECT *\nFROM listings\nWHERE price <= 2000000\n  AND size > (\n    SELECT AVG(size) FROM listings WHERE price <= 2000000\n  )\nLIMIT 50",
    },
    FewShotExample {
        question: "ขอดูอพาร์ตเมนต์ใน Cairo ที่มีอย่างน้อย 2 ห้องนอน จำกัด 20",
        sql: "SELECT *\nFROM listings\nWHERE type = 'apartment' AND location = 'Cairo' AND bedrooms >= 2\nLIMIT 20",
    },
];

pub struct SqlPromptBuilder {
    table_name: String,
    default_limit: u64,
    examples: Vec<FewShotExample>,
}

impl SqlPromptBuilder {
    pub fn new(table_name: impl Into<String>, default_limit: u64) -> Self {
        Self {
            table_name: table_name.into(),
            default_limit,
            examples: DEFAULT_EXAMPLES.to_vec(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    /// System prompt, the few-shot turns, then the question.
    pub fn build_messages(&self, question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + self.examples.len() * 2);
        messages.push(ChatMessage::system(self.system_prompt()));

        for example in &self.examples {
            messages.push(ChatMessage::user(example.question));
            messages.push(ChatMessage::assistant(example.sql));
        }

        messages.push(ChatMessage::user(self.user_prompt(question)));
        messages
    }

    pub fn system_prompt(&self) -> String {
        let table = &self.table_name;
        let filter_columns = LISTING_COLUMNS
            .iter()
            .map(|(name, _, _)| *name)
            .filter(|name| *name != "id")
            .collect::<Vec<_>>()
            .join(", ");

        let mut prompt = format!(
            "คุณเป็นผู้ช่วย Text-to-SQL สำหรับฐานข้อมูล SQLite ที่มีตารางเดียวชื่อ `{table}`.\n\n"
        );

        prompt.push_str(&format!("### ตาราง {table} (columns)\n"));
        for (name, sql_type, gloss) in LISTING_COLUMNS {
            prompt.push_str(&format!("- {name} ({sql_type}, {gloss})\n"));
        }

        prompt.push_str("\n### กฎสำคัญ\n");
        prompt.push_str(
            "1) ต้องสร้างคำสั่ง SQL ที่ขึ้นต้นด้วย `SELECT *` เท่านั้น และใช้ไวยากรณ์ SQLite\n",
        );
        prompt.push_str(&format!(
            "2) ใช้ตาราง `{table}` เพียงตารางเดียว (อนุญาตให้ตั้ง alias เช่น l); ห้ามอ้างอิงตารางอื่น\n"
        ));
        prompt.push_str(&format!(
            "3) ใช้เฉพาะคอลัมน์สำหรับ WHERE/ORDER BY ได้แก่: {filter_columns}\n"
        ));
        prompt.push_str("4) ห้ามเลือกคอลัมน์เฉพาะ ต้องใช้ SELECT * เสมอ\n");
        prompt.push_str(&format!(
            "5) ต้องมี LIMIT เสมอ (ค่าเริ่มต้น {} หากผู้ใช้ไม่ระบุ) และไม่มีเครื่องหมาย ; ท้ายคำสั่ง\n",
            self.default_limit
        ));
        prompt.push_str(
            "6) ห้ามมี comment (-- หรือ /* */) และห้ามมีคำอธิบายเพิ่มเติม ต้องส่งคืนเฉพาะ SQL เท่านั้น\n",
        );
        prompt.push_str(
            "7) ถ้ามีการเปรียบเทียบกับค่าเฉลี่ย/ค่าสถิติ (เช่น AVG, MIN, MAX) ให้ใช้ subquery ในเงื่อนไข WHERE แต่ SELECT หลักยังคงเป็น SELECT *\n",
        );
        prompt.push_str("8) ถ้ามีการจัดลำดับ ให้ใช้ ORDER BY ตามที่ถาม และยังคงมี LIMIT\n");

        prompt
    }

    pub fn user_prompt(&self, question: &str) -> String {
        format!(
            "คำถาม: {}\nโปรดส่งคืนเป็น **SQL ที่ขึ้นต้นด้วย SELECT * เพียงคำสั่งเดียว** ตามกฎด้านบน (ห้ามมีคำอธิบายเพิ่ม)",
            question
        )
    }
}
