// Shared prompt fragments. Each service that calls the LLM builds its own
// prompt next to its code and appends these where relevant.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to any prompt that rewrites commercial content.
pub const NUMERIC_FIDELITY_INSTRUCTION: &str = "\
    CRITICAL: Do NOT change any monetary amount, number, date, period or technical specification. \
    Do NOT add items that are not in the original and do NOT remove existing items. \
    Keep every investment item's name and amount exactly as provided, in the same order.";
