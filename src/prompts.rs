//! Prompts for LLM-based menu extraction.
//!
//! The system prompt carries the output contract (a bare JSON array of
//! `{category, name, description, price, currency}` objects); the user
//! prompt carries the menu text. Keeping both here lets tests inspect the
//! contract without a live provider.
//!
//! Callers can override the system prompt via
//! [`crate::config::IngestConfig::system_prompt`]; the response parser in
//! [`crate::pipeline::extract`] still expects the JSON array described below,
//! so an override must keep that contract.

/// Default system prompt for menu extraction.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a menu data extraction expert. Extract ALL menu items from the restaurant menu text supplied by the user.

Follow these rules precisely:

1. Extract every menu item you can find
2. Identify the category for each item (e.g., Appetizers, Main Courses, Desserts, Beverages)
3. Extract item name, description, price, and currency
4. If no description is provided, leave it empty
5. If multiple prices exist (e.g., different sizes), create separate entries
6. Normalize currency codes (e.g., Rs, රු -> LKR, $ -> USD)
7. Convert prices to numbers (remove currency symbols and commas)

REQUIRED OUTPUT FORMAT (JSON array):
[
  {
    "category": "string (e.g., Appetizers, Main Course)",
    "name": "string (item name)",
    "description": "string (optional, can be empty)",
    "price": number (numeric value only),
    "currency": "string (ISO code: LKR, USD, EUR, etc.)"
  }
]

IMPORTANT:
- Return ONLY a valid JSON array, no additional text
- Do NOT wrap the array in ```json fences
- Ensure all prices are positive numbers
- Use "LKR" as default currency if not specified
- Group items by category logically
- If you cannot extract data, return an empty array []"#;

/// User prompt wrapping the raw menu text.
pub fn menu_extraction_prompt(menu_text: &str) -> String {
    format!(
        "MENU TEXT:\n\"\"\"\n{}\n\"\"\"\n\nExtract the menu items now:",
        menu_text.trim()
    )
}
