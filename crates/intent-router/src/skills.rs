/// A routable capability, matched either by the classifier's predicted
/// intent name or by its own `can_handle` check (§4.12 step 3). Skills are
/// registered explicitly at startup, never discovered via reflection.
pub trait Skill: Send + Sync {
    fn intent_name(&self) -> &str;
    fn can_handle(&self, text: &str) -> bool;
    fn handle(&self, text: &str) -> String;
}

#[derive(Default)]
pub struct SkillRegistry {
    skills: Vec<Box<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Box<dyn Skill>) {
        self.skills.push(skill);
    }

    /// By `intent_name` first (first registered skill whose name matches),
    /// then by `can_handle`, in registration order.
    pub fn find(&self, intent: &str, text: &str) -> Option<&dyn Skill> {
        self.skills
            .iter()
            .find(|s| s.intent_name() == intent)
            .or_else(|| self.skills.iter().find(|s| s.can_handle(text)))
            .map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// Reference skill demonstrating the trait; also the one the reference
/// implementation's own greeting test exercises.
pub struct GreetingSkill;

impl Skill for GreetingSkill {
    fn intent_name(&self) -> &str {
        "greeting"
    }

    fn can_handle(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        ["hallo", "hi", "hello", "guten tag"].iter().any(|w| lower.contains(w))
    }

    fn handle(&self, _text: &str) -> String {
        "Hallo! Wie kann ich helfen?".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_prefers_intent_name_over_can_handle() {
        struct Other;
        impl Skill for Other {
            fn intent_name(&self) -> &str {
                "other"
            }
            fn can_handle(&self, text: &str) -> bool {
                text.contains("hallo")
            }
            fn handle(&self, _text: &str) -> String {
                "other".to_string()
            }
        }

        let mut registry = SkillRegistry::new();
        registry.register(Box::new(Other));
        registry.register(Box::new(GreetingSkill));

        let found = registry.find("greeting", "hallo da").unwrap();
        assert_eq!(found.handle("hallo da"), "Hallo! Wie kann ich helfen?");
    }

    #[test]
    fn find_falls_back_to_can_handle() {
        let mut registry = SkillRegistry::new();
        registry.register(Box::new(GreetingSkill));
        let found = registry.find("unknown", "hi there").unwrap();
        assert_eq!(found.intent_name(), "greeting");
    }

    #[test]
    fn find_returns_none_when_nothing_matches() {
        let registry = SkillRegistry::new();
        assert!(registry.find("greeting", "hi").is_none());
    }
}
