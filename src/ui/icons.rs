//! Shared status glyphs with plain-text fallbacks.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[STOP]");
pub static ROUND: Emoji<'_, '_> = Emoji("🔎 ", "[R]");
pub static NOTE: Emoji<'_, '_> = Emoji("📝 ", "*");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
