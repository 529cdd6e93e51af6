pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Vision-capable default model for a provider id.
pub fn default_model_for(provider_id: &str) -> &'static str {
    match provider_id.trim() {
        "openai" | "rig-openai" => DEFAULT_OPENAI_MODEL,
        _ => DEFAULT_GEMINI_MODEL,
    }
}
