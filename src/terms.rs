use crate::config::ClassificationConfig;
use crate::errors::AppError;

/// Turns a free-text product description into a bounded list of
/// normalized search terms.
///
/// Processing: lowercase, punctuation to spaces, collapse whitespace,
/// keep tokens of length >= 3, truncate to the configured maximum.
///
/// An empty output is valid: it means the description carried no usable
/// tokens and the caller should short-circuit to professional referral.
///
/// # Arguments
///
/// * `description` - Raw product description from the caller.
/// * `config` - Length limits and the term cap.
///
/// # Returns
///
/// * `Result<Vec<String>, AppError>` - Ordered search terms, or
///   `InvalidInput` when the trimmed description is shorter or longer than
///   the configured bounds.
pub fn extract_search_terms(
    description: &str,
    config: &ClassificationConfig,
) -> Result<Vec<String>, AppError> {
    let trimmed = description.trim();

    if trimmed.chars().count() < config.min_description_length {
        return Err(AppError::InvalidInput(format!(
            "Product description too short. Minimum {} characters.",
            config.min_description_length
        )));
    }
    if trimmed.chars().count() > config.max_description_length {
        return Err(AppError::InvalidInput(format!(
            "Product description too long. Maximum {} characters.",
            config.max_description_length
        )));
    }

    let cleaned: String = trimmed
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() >= 3)
        .take(config.max_search_terms)
        .map(|word| word.to_string())
        .collect();

    Ok(terms)
}
