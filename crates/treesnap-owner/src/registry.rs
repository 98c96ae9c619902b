//! Mapping from extension classes to author strategies.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use treesnap_core::{ExtensionClass, FormatTable};

use crate::formats::{MediaTagStrategy, OfficeStrategy, PdfInfoStrategy};
use crate::strategy::AuthorStrategy;

/// Registry of author strategies keyed by extension class.
///
/// Each extension belongs to at most one class (enforced by
/// [`FormatTable`] validation), so at most one strategy applies to a file.
/// Adding a format means registering a strategy for a class and listing its
/// extensions in the table; the walker never changes.
#[derive(Clone)]
pub struct StrategyRegistry {
    formats: FormatTable,
    strategies: IndexMap<ExtensionClass, Arc<dyn AuthorStrategy>>,
}

impl StrategyRegistry {
    /// Create a registry with no strategies.
    pub fn new(formats: FormatTable) -> Self {
        Self {
            formats,
            strategies: IndexMap::new(),
        }
    }

    /// Create a registry with the built-in readers for every class.
    pub fn with_defaults(formats: FormatTable) -> Self {
        Self::new(formats)
            .with(ExtensionClass::Document, OfficeStrategy::new("document"))
            .with(ExtensionClass::Spreadsheet, OfficeStrategy::new("spreadsheet"))
            .with(ExtensionClass::Presentation, OfficeStrategy::new("presentation"))
            .with(ExtensionClass::Pdf, PdfInfoStrategy)
            .with(ExtensionClass::Media, MediaTagStrategy)
    }

    /// Register a strategy, replacing any previous one for the class.
    pub fn register(
        &mut self,
        class: ExtensionClass,
        strategy: Arc<dyn AuthorStrategy>,
    ) -> Option<Arc<dyn AuthorStrategy>> {
        self.strategies.insert(class, strategy)
    }

    /// Builder-style variant of [`StrategyRegistry::register`].
    pub fn with(mut self, class: ExtensionClass, strategy: impl AuthorStrategy + 'static) -> Self {
        self.register(class, Arc::new(strategy));
        self
    }

    /// Extension table used for classification.
    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// Classes with a registered strategy, in registration order.
    pub fn classes(&self) -> impl Iterator<Item = ExtensionClass> + '_ {
        self.strategies.keys().copied()
    }

    /// Classify a path by its extension.
    pub fn class_of(&self, path: &Path) -> Option<ExtensionClass> {
        let extension = path.extension()?.to_str()?;
        self.formats.class_of(extension)
    }

    /// Strategy applying to a path, if its extension class has one.
    pub fn strategy_for(&self, path: &Path) -> Option<(ExtensionClass, Arc<dyn AuthorStrategy>)> {
        let class = self.class_of(path)?;
        self.strategies
            .get(&class)
            .map(|strategy| (class, Arc::clone(strategy)))
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("formats", &self.formats)
            .field(
                "strategies",
                &self
                    .strategies
                    .iter()
                    .map(|(class, s)| (*class, s.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;

    struct Fixed;

    impl AuthorStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn read_author(&self, _path: &Path) -> Result<String, StrategyError> {
            Ok("fixed".to_string())
        }
    }

    #[test]
    fn test_default_lookup() {
        let registry = StrategyRegistry::with_defaults(FormatTable::default());
        let (class, strategy) = registry.strategy_for(Path::new("/a/Report.DOCX")).unwrap();
        assert_eq!(class, ExtensionClass::Document);
        assert_eq!(strategy.name(), "document");

        let (class, _) = registry.strategy_for(Path::new("scan.pdf")).unwrap();
        assert_eq!(class, ExtensionClass::Pdf);

        assert!(registry.strategy_for(Path::new("notes.txt")).is_none());
        assert!(registry.strategy_for(Path::new("Makefile")).is_none());
        assert_eq!(registry.classes().count(), 5);
    }

    #[test]
    fn test_class_without_strategy() {
        let registry = StrategyRegistry::new(FormatTable::default());
        assert_eq!(
            registry.class_of(Path::new("a.pdf")),
            Some(ExtensionClass::Pdf)
        );
        assert!(registry.strategy_for(Path::new("a.pdf")).is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = StrategyRegistry::with_defaults(FormatTable::default());
        let previous = registry.register(ExtensionClass::Pdf, Arc::new(Fixed));
        assert_eq!(previous.map(|s| s.name()), Some("pdf"));

        let (_, strategy) = registry.strategy_for(Path::new("x.pdf")).unwrap();
        assert_eq!(strategy.read_author(Path::new("x.pdf")).unwrap(), "fixed");
    }
}
