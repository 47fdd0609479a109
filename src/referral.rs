use crate::cache_key;
use crate::config::{ClassificationConfig, TariffConfig, UsmcaConfig};
use crate::models::{
    ClassificationResponse, Complexity, QualificationResult, RateMatch, ReferralEvaluation,
    RuleSource, SavingsResult, Severity,
};
use chrono::Utc;

/// Decides when a case must go to a licensed customs broker.
///
/// Each pipeline stage contributes an independent sub-evaluation; the
/// merge takes the worst severity and complexity across them. Signals
/// only ever escalate a case, never soften another stage's escalation.
pub struct ReferralSystem {
    classification: ClassificationConfig,
    usmca: UsmcaConfig,
    tariff: TariffConfig,
}

#[derive(Debug, Default)]
struct SubEvaluation {
    forced: bool,
    severity: Option<Severity>,
    complexity: Option<Complexity>,
    reasons: Vec<String>,
    recommendations: Vec<String>,
}

impl ReferralSystem {
    pub fn new(
        classification: ClassificationConfig,
        usmca: UsmcaConfig,
        tariff: TariffConfig,
    ) -> Self {
        Self {
            classification,
            usmca,
            tariff,
        }
    }

    /// Merges all available stage outcomes into one escalation decision.
    pub fn evaluate(
        &self,
        classification: &ClassificationResponse,
        qualification: Option<&QualificationResult>,
        savings: Option<&SavingsResult>,
    ) -> ReferralEvaluation {
        let mut parts = vec![self.evaluate_classification(classification)];
        if let Some(q) = qualification {
            parts.push(self.evaluate_qualification(q));
        }
        if let Some(s) = savings {
            parts.push(self.evaluate_savings(s));
        }

        self.merge(parts)
    }

    fn evaluate_classification(&self, response: &ClassificationResponse) -> SubEvaluation {
        let mut sub = SubEvaluation::default();

        if !response.is_success() {
            sub.forced = true;
            sub.severity = Some(Severity::High);
            sub.reasons
                .push("Automated classification could not identify qualified codes".to_string());
            sub.recommendations.push(
                "Provide a more detailed product description or consult a customs broker"
                    .to_string(),
            );
            return sub;
        }

        let confidence = response.top_confidence().unwrap_or(0.0);
        let minimum = self.classification.min_confidence_threshold;
        let professional = self.classification.professional_referral_threshold;

        if confidence < minimum {
            sub.forced = true;
            sub.severity = Some(Severity::Medium);
            sub.reasons.push(format!(
                "Classification confidence {:.0}% below minimum {:.0}%",
                confidence * 100.0,
                minimum * 100.0
            ));
        } else if confidence < professional {
            sub.forced = true;
            sub.severity = Some(Severity::Low);
            sub.reasons.push(format!(
                "Classification confidence {:.0}% suggests professional review",
                confidence * 100.0
            ));
        } else {
            sub.recommendations.push(
                "Classification confidence is strong; broker validation optional".to_string(),
            );
        }

        sub
    }

    fn evaluate_qualification(&self, result: &QualificationResult) -> SubEvaluation {
        let mut sub = SubEvaluation::default();

        if !result.qualified {
            sub.reasons
                .push("Product does not currently qualify for USMCA preference".to_string());
            sub.complexity = Some(Complexity::Medium);

            let gap = result.threshold_applied - result.regional_content_percentage;
            if gap > 0.0 && gap <= self.usmca.close_gap_margin {
                sub.forced = true;
                sub.severity = Some(Severity::Medium);
                sub.reasons.push(format!(
                    "Only {:.1}% away from USMCA qualification",
                    gap
                ));
                sub.recommendations.push(
                    "A broker can identify sourcing changes to close the qualification gap"
                        .to_string(),
                );
            }
        } else {
            let marginal_ceiling =
                result.threshold_applied + self.usmca.marginal_qualification_margin;
            if result.regional_content_percentage < marginal_ceiling {
                sub.reasons.push(format!(
                    "Qualification is marginal at {:.1}% regional content",
                    result.regional_content_percentage
                ));
                sub.complexity = Some(Complexity::Medium);
            }
        }

        if result.rule_source == RuleSource::EmergencyFallback {
            sub.forced = true;
            sub.severity = Some(Severity::High);
            sub.complexity = Some(Complexity::Complex);
            sub.reasons.push(
                "Qualification used a default rule; the product-specific rule was unavailable"
                    .to_string(),
            );
        }

        sub
    }

    fn evaluate_savings(&self, result: &SavingsResult) -> SubEvaluation {
        let mut sub = SubEvaluation::default();

        if result.match_type == RateMatch::EmergencyFallback {
            sub.forced = true;
            sub.severity = Some(Severity::High);
            sub.reasons
                .push("Savings estimate used emergency fallback rates".to_string());
        }

        if result.annual_savings > self.tariff.high_value_savings_threshold {
            sub.severity = Some(Severity::Medium);
            sub.reasons.push(format!(
                "High potential savings of ${:.0} annually warrant professional verification",
                result.annual_savings
            ));
        }

        if result.mfn_rate > self.tariff.high_mfn_rate_threshold {
            sub.recommendations.push(format!(
                "MFN rate of {:.1}% is unusually high; verify the classification before relying on it",
                result.mfn_rate
            ));
        }

        sub
    }

    fn merge(&self, parts: Vec<SubEvaluation>) -> ReferralEvaluation {
        let mut forced = false;
        let mut severity = Severity::Low;
        let mut complexity = Complexity::Simple;
        let mut reasons = Vec::new();
        let mut recommendations = Vec::new();

        for part in parts {
            forced |= part.forced;
            if let Some(s) = part.severity {
                severity = severity.max(s);
            }
            if let Some(c) = part.complexity {
                complexity = complexity.max(c);
            }
            reasons.extend(part.reasons);
            recommendations.extend(part.recommendations);
        }

        let requires_professional = forced
            || complexity == Complexity::Complex
            || severity == Severity::High
            || (severity == Severity::Medium && reasons.len() >= 2);

        ReferralEvaluation {
            requires_professional,
            severity,
            estimated_complexity: complexity,
            referral_code: requires_professional.then(|| generate_referral_code(&reasons)),
            reasons,
            recommendations,
        }
    }

    /// Decision used when an upstream stage failed outright. Errs toward
    /// escalation: a broker reviewing a clean case is cheaper than an
    /// importer acting on a silently broken one.
    pub fn conservative_fallback(&self) -> ReferralEvaluation {
        let reasons = vec![
            "Automated evaluation could not be completed".to_string(),
        ];
        ReferralEvaluation {
            requires_professional: true,
            severity: Severity::High,
            estimated_complexity: Complexity::Complex,
            referral_code: Some(generate_referral_code(&reasons)),
            reasons,
            recommendations: vec![
                "Contact a licensed customs broker for a full compliance review".to_string(),
            ],
        }
    }
}

/// Human-shareable referral code, unique per moment and reason set.
pub fn generate_referral_code(reasons: &[String]) -> String {
    let digest = cache_key::short_digest(&reasons.join("|"));
    format!("REF_{}_{}", Utc::now().timestamp_millis(), digest)
}
