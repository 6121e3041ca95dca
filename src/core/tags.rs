/// Inline tag grammar and dispatch.
///
/// A tag is either `key:value` (whitespace around both halves is trimmed) or
/// one of a small set of bare keywords. Tags are parsed once into a
/// `TagDirective` and routed to a `DirectiveTarget`; anything that cannot be
/// routed becomes a `TagDiagnostic` and the rest of the batch carries on.
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Tag grammar revision. Bump when keys or bare keywords change meaning.
pub const TAG_GRAMMAR_VERSION: u32 = 1;

/// The handler a tag key routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKey {
    Speaker,
    Audio,
    StartQuest,
    CompleteQuest,
}

/// Where a directive's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TagValue {
    Given(String),
    /// Bare keyword form; the quest comes from the dispatcher's context.
    CurrentQuest,
}

/// A parsed, typed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagDirective {
    Speaker(String),
    Audio(String),
    StartQuest(String),
    CompleteQuest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagDiagnostic {
    #[error("tag could not be parsed: '{0}'")]
    MalformedTag(String),
    #[error("tag is not handled: '{0}'")]
    UnhandledTag(String),
    #[error("quest tag '{0}' has no quest to refer to")]
    MissingQuestIdentity(String),
}

/// Outcome of dispatching one batch of tags, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub applied: Vec<TagDirective>,
    pub diagnostics: Vec<TagDiagnostic>,
}

/// Receives directives as they are dispatched.
pub trait DirectiveTarget {
    fn apply(&mut self, directive: &TagDirective);
}

/// Either half of a successfully split tag.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RawTag<'a> {
    KeyValue { key: String, value: &'a str },
    Bare(String),
}

fn split_tag(raw: &str) -> Option<RawTag<'_>> {
    let mut parts = raw.split(':');
    let first = parts.next()?;
    match (parts.next(), parts.next()) {
        (Some(value), None) => {
            let key = first.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some(RawTag::KeyValue {
                key: key.to_ascii_lowercase(),
                value,
            })
        }
        (None, _) => {
            let word = first.trim();
            (!word.is_empty()).then(|| RawTag::Bare(word.to_ascii_lowercase()))
        }
        _ => None,
    }
}

/// Parses tags and routes them to a `DirectiveTarget`.
#[derive(Debug, Clone)]
pub struct TagDispatcher {
    keys: FxHashMap<String, TagKey>,
    bare_keywords: FxHashMap<String, TagKey>,
    current_quest: Option<String>,
}

impl Default for TagDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TagDispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            keys: FxHashMap::default(),
            bare_keywords: FxHashMap::default(),
            current_quest: None,
        };
        dispatcher.register_key("speaker", TagKey::Speaker);
        dispatcher.register_key("audio", TagKey::Audio);
        dispatcher.register_key("voice", TagKey::Audio);
        dispatcher.register_key("start_quest", TagKey::StartQuest);
        dispatcher.register_key("complete_quest", TagKey::CompleteQuest);
        dispatcher
            .bare_keywords
            .insert("start_quest".to_string(), TagKey::StartQuest);
        dispatcher
            .bare_keywords
            .insert("complete_quest".to_string(), TagKey::CompleteQuest);
        dispatcher
    }

    /// Route an additional key (e.g. a content-specific alias) to a handler.
    pub fn register_key(&mut self, key: &str, handler: TagKey) {
        self.keys.insert(key.trim().to_ascii_lowercase(), handler);
    }

    /// Quest used by bare `start_quest` / `complete_quest` keywords.
    pub fn set_current_quest(&mut self, quest: Option<String>) {
        self.current_quest = quest;
    }

    pub fn current_quest(&self) -> Option<&str> {
        self.current_quest.as_deref()
    }

    /// Parse one tag without dispatching it.
    pub fn parse(&self, raw: &str) -> Result<TagDirective, TagDiagnostic> {
        match split_tag(raw) {
            Some(RawTag::KeyValue { key, value }) => match self.keys.get(&key) {
                Some(handler) => {
                    self.directive(*handler, TagValue::Given(value.to_string()), raw)
                }
                None => Err(TagDiagnostic::UnhandledTag(raw.to_string())),
            },
            Some(RawTag::Bare(word)) => match self.bare_keywords.get(&word) {
                Some(handler) => self.directive(*handler, TagValue::CurrentQuest, raw),
                None => Err(TagDiagnostic::MalformedTag(raw.to_string())),
            },
            None => Err(TagDiagnostic::MalformedTag(raw.to_string())),
        }
    }

    fn directive(
        &self,
        handler: TagKey,
        value: TagValue,
        raw: &str,
    ) -> Result<TagDirective, TagDiagnostic> {
        let value = match value {
            TagValue::Given(value) => value,
            TagValue::CurrentQuest => self
                .current_quest
                .clone()
                .ok_or_else(|| TagDiagnostic::MissingQuestIdentity(raw.to_string()))?,
        };
        Ok(match handler {
            TagKey::Speaker => TagDirective::Speaker(value),
            TagKey::Audio => TagDirective::Audio(value),
            TagKey::StartQuest => TagDirective::StartQuest(value),
            TagKey::CompleteQuest => TagDirective::CompleteQuest(value),
        })
    }

    /// Parse and apply a batch of tags in order. Bad tags are reported and
    /// skipped.
    pub fn dispatch<S: AsRef<str>>(
        &self,
        tags: &[S],
        target: &mut dyn DirectiveTarget,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for raw in tags {
            let raw = raw.as_ref();
            match self.parse(raw) {
                Ok(directive) => {
                    tracing::debug!(tag = %raw, ?directive, "dispatching tag");
                    target.apply(&directive);
                    report.applied.push(directive);
                }
                Err(diagnostic) => {
                    match &diagnostic {
                        TagDiagnostic::UnhandledTag(_) => {
                            tracing::info!(%diagnostic, "tag came in but is not handled")
                        }
                        _ => tracing::warn!(%diagnostic, "skipping tag"),
                    }
                    report.diagnostics.push(diagnostic);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<TagDirective>,
    }

    impl DirectiveTarget for Recorder {
        fn apply(&mut self, directive: &TagDirective) {
            self.seen.push(directive.clone());
        }
    }

    #[test]
    fn speaker_then_quest_in_order() {
        let dispatcher = TagDispatcher::new();
        let mut recorder = Recorder::default();
        let report = dispatcher.dispatch(&["speaker: Mira", "start_quest: FindKey"], &mut recorder);

        assert_eq!(
            recorder.seen,
            vec![
                TagDirective::Speaker("Mira".to_string()),
                TagDirective::StartQuest("FindKey".to_string()),
            ]
        );
        assert_eq!(report.applied, recorder.seen);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn trims_and_lowercases_key() {
        let dispatcher = TagDispatcher::new();
        assert_eq!(
            dispatcher.parse("  Speaker :  Old Tom  "),
            Ok(TagDirective::Speaker("Old Tom".to_string()))
        );
        assert_eq!(
            dispatcher.parse("voice:gruff"),
            Ok(TagDirective::Audio("gruff".to_string()))
        );
    }

    #[test]
    fn malformed_tags_do_not_abort_batch() {
        let dispatcher = TagDispatcher::new();
        let mut recorder = Recorder::default();
        let report = dispatcher.dispatch(
            &["speaker:a:b", "audio: chirpy", "nonsense", ":empty", "speaker:"],
            &mut recorder,
        );

        assert_eq!(recorder.seen, vec![TagDirective::Audio("chirpy".to_string())]);
        assert_eq!(
            report.diagnostics,
            vec![
                TagDiagnostic::MalformedTag("speaker:a:b".to_string()),
                TagDiagnostic::MalformedTag("nonsense".to_string()),
                TagDiagnostic::MalformedTag(":empty".to_string()),
                TagDiagnostic::MalformedTag("speaker:".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_key_is_unhandled() {
        let dispatcher = TagDispatcher::new();
        assert_eq!(
            dispatcher.parse("mood: grim"),
            Err(TagDiagnostic::UnhandledTag("mood: grim".to_string()))
        );
    }

    #[test]
    fn bare_keyword_uses_current_quest() {
        let mut dispatcher = TagDispatcher::new();
        assert_eq!(
            dispatcher.parse("start_quest"),
            Err(TagDiagnostic::MissingQuestIdentity("start_quest".to_string()))
        );

        dispatcher.set_current_quest(Some("FindKey".to_string()));
        assert_eq!(
            dispatcher.parse(" complete_quest "),
            Ok(TagDirective::CompleteQuest("FindKey".to_string()))
        );
        // key:value still wins over the context quest
        assert_eq!(
            dispatcher.parse("start_quest: Other"),
            Ok(TagDirective::StartQuest("Other".to_string()))
        );
    }

    #[test]
    fn registered_alias_routes_to_handler() {
        let mut dispatcher = TagDispatcher::new();
        dispatcher.register_key("who", TagKey::Speaker);
        assert_eq!(
            dispatcher.parse("who: Mira"),
            Ok(TagDirective::Speaker("Mira".to_string()))
        );
    }
}
