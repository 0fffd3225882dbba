//! Emoji used by the terminal UI, with plain-text fallbacks.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static PLAN: Emoji<'_, '_> = Emoji("🗺️  ", "[PLAN]");
pub static FILE: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "[DEPLOY]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static TERMINAL: Emoji<'_, '_> = Emoji("💻 ", "$");
pub static INBOX: Emoji<'_, '_> = Emoji("📥 ", "[IN]");
