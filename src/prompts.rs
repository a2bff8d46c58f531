//! Instructions sent alongside each image.
//!
//! Two built-in prompts exist, one per sink format:
//!
//! * [`TABLE_PROMPT`] asks for a Markdown table of part number, quantity and
//!   serial number. The answer is stored verbatim in the CSV sink.
//! * [`JSON_PROMPT_TEMPLATE`] asks for a single JSON object with the keys the
//!   aggregator understands. The target filename is the only per-image value
//!   and is substituted for `{filename}`.
//!
//! Callers can override either via [`crate::config::OcrConfig::prompt`]; the
//! same `{filename}` placeholder is honoured there.

use crate::config::{OcrConfig, OutputFormat};

/// Placeholder replaced with the image filename.
pub const FILENAME_PLACEHOLDER: &str = "{filename}";

/// Prompt for the CSV sink: free-form Markdown table.
pub const TABLE_PROMPT: &str = r#"The image below is part of a lighting-fixture specification drawing (照明器具の仕様書).
Extract the part number (品番), the quantity (個数) and the serial number (通し番号) of every fixture shown.

Output a Markdown table in exactly this shape:

| 品番 | 個数 | 通し番号 |
|------|------|----------|
| XXXX-YYYY-ZZZ | 2台 | 402 |
| ABCD-1234-XYZ | 1台 | 150 |

Rules:
1. Prefer strings that look like manufacturer part numbers (e.g. NNFW42500K LE9).
2. If no part number is visible, write 品番なし.
3. Write quantities with the 台 counter (e.g. 2台).
4. Copy serial numbers such as H402 exactly as printed.
5. If the image contains a table, read it row by row."#;

/// Prompt for the JSON sink. Contains one [`FILENAME_PLACEHOLDER`].
pub const JSON_PROMPT_TEMPLATE: &str = r#"The image below is part of a lighting-fixture specification drawing (照明器具の仕様書).
Analyse it and answer with ONE JSON object and nothing else, using these keys:

{
  "filename": "{filename}",
  "hinban": "<part number or public-facility model number>",
  "num_items": "<number of fixtures required>",
  "serial_num": "<serial number printed at the top left>",
  "other": "<any other fixture information: brand, specification, location>"
}

Example:
{
  "filename": "{filename}",
  "hinban": "X323FS",
  "num_items": "2",
  "serial_num": "A301",
  "other": "LED照明、色温度5000K"
}

Rules:
1. Prefer strings that look like manufacturer part numbers (e.g. NNFW42500K LE9).
2. If no part number is visible, use "商品番号なし".
3. If there are several part numbers, list them all.
4. Copy serial numbers such as H402 exactly as printed.
5. Move any non-alphanumeric characters of a part number into "other".
6. Do NOT wrap the object in code fences and do NOT add commentary."#;

/// Build the instruction for one image.
///
/// Uses `config.prompt` when set, otherwise the built-in prompt for
/// `config.output_format`. `{filename}` is replaced in either case.
pub fn prompt_for(config: &OcrConfig, filename: &str) -> String {
    let template = match (&config.prompt, config.output_format) {
        (Some(custom), _) => custom.as_str(),
        (None, OutputFormat::Csv) => TABLE_PROMPT,
        (None, OutputFormat::Json) => JSON_PROMPT_TEMPLATE,
    };
    template.replace(FILENAME_PLACEHOLDER, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_prompt_embeds_filename() {
        let config = OcrConfig::default();
        let p = prompt_for(&config, "image3.png");
        assert!(p.contains("\"filename\": \"image3.png\""));
        assert!(!p.contains(FILENAME_PLACEHOLDER));
    }

    #[test]
    fn csv_format_uses_table_prompt() {
        let config = OcrConfig::builder()
            .output_format(OutputFormat::Csv)
            .build()
            .unwrap();
        assert_eq!(prompt_for(&config, "page_1.png"), TABLE_PROMPT);
    }

    #[test]
    fn custom_prompt_overrides_builtin() {
        let config = OcrConfig::builder()
            .prompt("Read {filename} please")
            .build()
            .unwrap();
        assert_eq!(prompt_for(&config, "a.png"), "Read a.png please");
    }

    #[test]
    fn json_prompt_lists_all_schema_keys() {
        for key in ["filename", "hinban", "num_items", "serial_num", "other"] {
            assert!(JSON_PROMPT_TEMPLATE.contains(&format!("\"{key}\"")), "{key}");
        }
    }
}
