//! Built-in signature catalog

use super::types::{BotCategory, NewSignature, PriorityTier, SignatureSource};
use crate::error::StoreError;
use crate::store::{SignatureRepository, StoreResult};

struct BuiltinBot {
    name: &'static str,
    vendor: &'static str,
    category: BotCategory,
    priority: PriorityTier,
}

const BUILTIN_BOTS: &[BuiltinBot] = &[
    BuiltinBot { name: "ClaudeBot", vendor: "Anthropic", category: BotCategory::Ai, priority: PriorityTier::High },
    BuiltinBot { name: "anthropic-ai", vendor: "Anthropic", category: BotCategory::Ai, priority: PriorityTier::High },
    BuiltinBot { name: "GPTBot", vendor: "OpenAI", category: BotCategory::Ai, priority: PriorityTier::High },
    BuiltinBot { name: "ChatGPT-User", vendor: "OpenAI", category: BotCategory::Ai, priority: PriorityTier::High },
    BuiltinBot { name: "PerplexityBot", vendor: "Perplexity", category: BotCategory::Ai, priority: PriorityTier::High },
    BuiltinBot { name: "Bytespider", vendor: "ByteDance", category: BotCategory::Ai, priority: PriorityTier::Medium },
    BuiltinBot { name: "cohere-ai", vendor: "Cohere", category: BotCategory::Ai, priority: PriorityTier::Medium },
    BuiltinBot { name: "Google-Extended", vendor: "Google", category: BotCategory::Ai, priority: PriorityTier::Medium },
    BuiltinBot { name: "FacebookBot", vendor: "Meta", category: BotCategory::Social, priority: PriorityTier::Medium },
    BuiltinBot { name: "Applebot-Extended", vendor: "Apple", category: BotCategory::Ai, priority: PriorityTier::Medium },
    BuiltinBot { name: "Googlebot", vendor: "Google", category: BotCategory::Search, priority: PriorityTier::Medium },
    BuiltinBot { name: "Bingbot", vendor: "Microsoft", category: BotCategory::Search, priority: PriorityTier::Medium },
    BuiltinBot { name: "DuckDuckBot", vendor: "DuckDuckGo", category: BotCategory::Search, priority: PriorityTier::Medium },
];

/// Seed signatures for every built-in crawler
pub fn builtin_signatures() -> Vec<NewSignature> {
    BUILTIN_BOTS
        .iter()
        .map(|bot| NewSignature {
            pattern: bot.name.to_string(),
            bot_vendor: Some(bot.vendor.to_string()),
            category: bot.category,
            priority: bot.priority,
            confidence: 1.0,
            source: SignatureSource::Manual,
            ..NewSignature::regex(bot.name, bot.name)
        })
        .collect()
}

/// Insert the built-in signatures that are not in the catalog yet.
///
/// Returns how many were inserted; running it again inserts nothing.
pub fn seed_builtin<R: SignatureRepository + ?Sized>(repo: &R, now: i64) -> StoreResult<usize> {
    let mut inserted = 0;
    for sig in builtin_signatures() {
        if repo.find_by_pattern(&sig.pattern)?.is_some() {
            continue;
        }
        match repo.insert_signature(&sig, now) {
            Ok(_) => inserted += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
    }
    if inserted > 0 {
        log::info!("Seeded {} built-in signatures", inserted);
    }
    Ok(inserted)
}
