/// Classifier output (§4.12 step 1).
#[derive(Debug, Clone, PartialEq)]
pub struct IntentPrediction {
    pub intent: String,
    pub confidence: f32,
}

pub type IntentMatcher = Box<dyn Fn(&str) -> f32 + Send + Sync>;

/// First-match-wins intent classifier. Deliberately a stand-in for real
/// NLU: a `Vec` of `(intent_name, matcher)` pairs evaluated in registration
/// order, the first match at or above `threshold` winning (§4.12, §9).
pub struct IntentClassifier {
    registry: Vec<(String, IntentMatcher)>,
    threshold: f32,
}

impl IntentClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { registry: Vec::new(), threshold }
    }

    pub fn register(&mut self, intent_name: impl Into<String>, matcher: IntentMatcher) {
        self.registry.push((intent_name.into(), matcher));
    }

    pub fn classify(&self, text: &str) -> IntentPrediction {
        let lower = text.to_lowercase();
        for (intent, matcher) in &self.registry {
            let confidence = matcher(&lower);
            if confidence >= self.threshold {
                return IntentPrediction { intent: intent.clone(), confidence };
            }
        }
        IntentPrediction { intent: "unknown".to_string(), confidence: 0.0 }
    }
}

/// Matcher that fires with a fixed confidence when any keyword appears as a
/// substring of the (already-lowercased) input.
pub fn keyword_matcher(keywords: &'static [&'static str], confidence: f32) -> IntentMatcher {
    Box::new(move |text: &str| {
        if keywords.iter().any(|k| text.contains(k)) {
            confidence
        } else {
            0.0
        }
    })
}

/// The registry shipped by default: a handful of illustrative intents plus
/// `external_request`, which the router treats specially (§4.12 step 2).
pub fn default_classifier() -> IntentClassifier {
    let mut classifier = IntentClassifier::new(0.5);
    classifier.register(
        "external_request",
        keyword_matcher(&["workflow", "automation", "n8n", "trigger", "schalte"], 0.8),
    );
    classifier.register(
        "time_query",
        keyword_matcher(&["zeit", "uhrzeit", "wie spät", "what time", "time is it"], 0.8),
    );
    classifier.register(
        "greeting",
        keyword_matcher(&["hallo", "hi ", "hello", "guten tag"], 0.8),
    );
    classifier.register(
        "gratitude",
        keyword_matcher(&["danke", "vielen dank", "thanks", "thank you"], 0.8),
    );
    classifier.register(
        "knowledge",
        keyword_matcher(&["frage", "wissen", "hilfe", "wetter", "weather", "help", "status"], 0.6),
    );
    classifier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_match_wins() {
        let mut classifier = IntentClassifier::new(0.5);
        classifier.register("a", keyword_matcher(&["x"], 0.9));
        classifier.register("b", keyword_matcher(&["x"], 0.9));
        assert_eq!(classifier.classify("x").intent, "a");
    }

    #[test]
    fn below_threshold_falls_through_to_unknown() {
        let mut classifier = IntentClassifier::new(0.5);
        classifier.register("a", keyword_matcher(&["x"], 0.1));
        let prediction = classifier.classify("x");
        assert_eq!(prediction.intent, "unknown");
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn default_classifier_recognizes_external_request() {
        let prediction = default_classifier().classify("bitte schalte den workflow");
        assert_eq!(prediction.intent, "external_request");
    }

    #[test]
    fn default_classifier_recognizes_greeting() {
        let prediction = default_classifier().classify("Hallo!");
        assert_eq!(prediction.intent, "greeting");
    }

    #[test]
    fn default_classifier_falls_back_to_unknown() {
        let prediction = default_classifier().classify("asdkjhasdlkjh");
        assert_eq!(prediction.intent, "unknown");
    }
}
