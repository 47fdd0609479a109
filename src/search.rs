use crate::catalog::CatalogService;
use crate::config::ClassificationConfig;
use crate::models::{CatalogCandidate, SearchStrategy};

/// Runs the three catalog search strategies and merges their hits.
///
/// Sub-queries are independent: a failing strategy is logged and skipped
/// so one bad query never empties the whole candidate set.
pub struct SearchEngine {
    catalog: CatalogService,
    config: ClassificationConfig,
}

impl SearchEngine {
    pub fn new(catalog: CatalogService, config: ClassificationConfig) -> Self {
        Self { catalog, config }
    }

    /// Collects candidates across all strategies, deduplicated by code.
    ///
    /// The first strategy to produce a code wins; later strategies never
    /// overwrite an existing candidate. Single-term runs first because its
    /// matches carry the most direct term evidence.
    pub async fn find_candidates(
        &self,
        terms: &[String],
        business_type: Option<&str>,
    ) -> Vec<CatalogCandidate> {
        let mut candidates: Vec<CatalogCandidate> = Vec::new();

        self.run_single_term(terms, &mut candidates).await;
        self.run_multi_term(terms, &mut candidates).await;
        if let Some(bt) = business_type {
            self.run_business_type(bt, terms, &mut candidates).await;
        }

        candidates.truncate(self.config.max_results);
        tracing::debug!("Search strategies produced {} candidates", candidates.len());
        candidates
    }

    async fn run_single_term(&self, terms: &[String], out: &mut Vec<CatalogCandidate>) {
        for term in terms.iter().take(self.config.max_single_term_queries) {
            match self
                .catalog
                .search_products(term, self.config.single_term_limit)
                .await
            {
                Ok(products) => {
                    for product in products {
                        push_unique(
                            out,
                            CatalogCandidate::from_product(
                                product,
                                SearchStrategy::SingleTerm,
                                vec![term.clone()],
                            ),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!("Single-term search for '{}' failed: {}", term, e);
                }
            }
        }
    }

    async fn run_multi_term(&self, terms: &[String], out: &mut Vec<CatalogCandidate>) {
        for combination in generate_term_combinations(terms, self.config.max_term_combinations) {
            let phrase = combination.join(" ");
            match self
                .catalog
                .search_products(&phrase, self.config.multi_term_limit)
                .await
            {
                Ok(products) => {
                    for product in products {
                        push_unique(
                            out,
                            CatalogCandidate::from_product(
                                product,
                                SearchStrategy::MultiTerm,
                                combination.clone(),
                            ),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!("Multi-term search for '{}' failed: {}", phrase, e);
                }
            }
        }
    }

    async fn run_business_type(
        &self,
        business_type: &str,
        terms: &[String],
        out: &mut Vec<CatalogCandidate>,
    ) {
        let chapters = match self.chapters_for_business_type(business_type).await {
            Some(chapters) => chapters,
            None => {
                tracing::debug!("No chapter mapping for business type '{}'", business_type);
                return;
            }
        };

        for chapter in &chapters {
            match self
                .catalog
                .search_products_by_prefix(chapter, self.config.business_type_limit)
                .await
            {
                Ok(products) => {
                    for product in products {
                        let description_lower = product.product_description.to_lowercase();
                        let matched: Vec<String> = terms
                            .iter()
                            .filter(|t| description_lower.contains(t.as_str()))
                            .cloned()
                            .collect();
                        // Chapter prefix alone is too weak a signal; require
                        // at least one term in the description
                        if matched.is_empty() {
                            continue;
                        }
                        let mut candidate = CatalogCandidate::from_product(
                            product,
                            SearchStrategy::BusinessType,
                            matched,
                        );
                        candidate.matched_business_type = Some(business_type.to_string());
                        push_unique(out, candidate);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Business-type search in chapter {} failed: {}",
                        chapter,
                        e
                    );
                }
            }
        }
    }

    /// Chapter prefixes to scan for a business type.
    ///
    /// Prefers the chapters named by qualification rules for that product
    /// category; the static table is the backstop when the rule lookup
    /// fails or carries no chapter rows for the type.
    async fn chapters_for_business_type(&self, business_type: &str) -> Option<Vec<String>> {
        match self
            .catalog
            .get_qualification_rules(None, Some(business_type))
            .await
        {
            Ok(rows) => {
                let mut chapters: Vec<String> = Vec::new();
                for row in rows {
                    if row.is_default {
                        continue;
                    }
                    if let Some(chapter) = row.hs_chapter {
                        if !chapter.is_empty() && !chapters.contains(&chapter) {
                            chapters.push(chapter);
                        }
                    }
                }
                if !chapters.is_empty() {
                    return Some(chapters);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Rule lookup for business type '{}' failed: {}",
                    business_type,
                    e
                );
            }
        }

        business_type_chapters(business_type)
            .map(|chapters| chapters.into_iter().map(str::to_string).collect())
    }
}

fn push_unique(out: &mut Vec<CatalogCandidate>, candidate: CatalogCandidate) {
    if out.iter().any(|c| c.hs_code == candidate.hs_code) {
        return;
    }
    out.push(candidate);
}

/// All 2-term combinations plus the leading 3-term window, capped at
/// `max` combinations.
pub fn generate_term_combinations(terms: &[String], max: usize) -> Vec<Vec<String>> {
    let mut combinations = Vec::new();

    for i in 0..terms.len() {
        for j in (i + 1)..terms.len() {
            combinations.push(vec![terms[i].clone(), terms[j].clone()]);
        }
    }

    if terms.len() >= 3 {
        combinations.push(vec![
            terms[0].clone(),
            terms[1].clone(),
            terms[2].clone(),
        ]);
    }

    combinations.truncate(max);
    combinations
}

/// Static backstop mapping business types to chapter prefixes, used when
/// the rules table has no chapter rows for a type. Unknown types get no
/// chapter search.
pub fn business_type_chapters(business_type: &str) -> Option<Vec<&'static str>> {
    let chapters: Vec<&'static str> = match business_type.to_lowercase().as_str() {
        "automotive" => vec!["87", "40", "73", "84", "85"],
        "electronics" => vec!["85", "84", "90"],
        "textile" | "textiles" => vec!["61", "62", "63", "58", "59"],
        "chemicals" => vec!["28", "29", "32", "34", "38", "39"],
        "agriculture" => vec!["02", "04", "07", "08", "10", "12"],
        "metals" => vec!["72", "73", "74", "76", "82", "83"],
        _ => return None,
    };
    Some(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_combinations_pairs_then_triple() {
        let combos = generate_term_combinations(&terms(&["a", "b", "c"]), 10);
        assert_eq!(
            combos,
            vec![
                terms(&["a", "b"]),
                terms(&["a", "c"]),
                terms(&["b", "c"]),
                terms(&["a", "b", "c"]),
            ]
        );
    }

    #[test]
    fn test_combinations_capped() {
        let combos = generate_term_combinations(&terms(&["a", "b", "c", "d", "e"]), 5);
        assert_eq!(combos.len(), 5);
        // Cap keeps the earliest pairs, which cover the leading terms
        assert_eq!(combos[0], terms(&["a", "b"]));
    }

    #[test]
    fn test_combinations_single_term_yields_nothing() {
        assert!(generate_term_combinations(&terms(&["solo"]), 5).is_empty());
    }

    #[test]
    fn test_business_type_chapters_known_and_unknown() {
        assert!(business_type_chapters("Automotive").is_some());
        assert!(business_type_chapters("electronics").is_some());
        assert!(business_type_chapters("consulting").is_none());
    }

    #[test]
    fn test_push_unique_keeps_first_seen() {
        use crate::models::ProductRecord;

        let product = |code: &str, desc: &str| ProductRecord {
            hs_code: code.to_string(),
            product_description: desc.to_string(),
            mfn_tariff_rate: None,
            usmca_tariff_rate: None,
            usmca_eligible: None,
        };

        let mut out = Vec::new();
        push_unique(
            &mut out,
            CatalogCandidate::from_product(
                product("850440", "first"),
                SearchStrategy::SingleTerm,
                terms(&["charger"]),
            ),
        );
        push_unique(
            &mut out,
            CatalogCandidate::from_product(
                product("850440", "second"),
                SearchStrategy::MultiTerm,
                terms(&["phone", "charger"]),
            ),
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_description, "first");
        assert_eq!(out[0].strategy, SearchStrategy::SingleTerm);
    }
}
