use async_trait::async_trait;

use crate::descriptor::{LaunchContext, LaunchDescriptor};
use crate::error::{Error, Result};
use crate::plan::{PlanOutcome, SpawnPlan};
use crate::variant::LauncherVariant;
use crate::variants::open::{open_plan, open_target};

/// Opens a document with a reader application.
///
/// Without a configured reader the content is handed to the OS default
/// handler, which makes this the dispatcher's fallback for unknown types.
#[derive(Debug)]
pub struct ContentVariant {
    name: &'static str,
    default_reader: Option<&'static str>,
}

impl ContentVariant {
    fn reader<'a>(&'a self, descriptor: &'a LaunchDescriptor) -> Option<&'a str> {
        descriptor
            .options
            .reader_exe
            .as_deref()
            .or(self.default_reader)
    }

    pub fn new() -> Self {
        Self {
            name: "content",
            default_reader: None,
        }
    }

    /// A content variant bound to a specific reader, e.g. `pdf@evince`.
    pub fn with_reader(name: &'static str, reader: &'static str) -> Self {
        Self {
            name,
            default_reader: Some(reader),
        }
    }
}

impl Default for ContentVariant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LauncherVariant for ContentVariant {
    fn name(&self) -> &'static str {
        self.name
    }

    fn build_spawn_plan(
        &self,
        descriptor: &LaunchDescriptor,
        ctx: &LaunchContext,
    ) -> Result<PlanOutcome> {
        let plan = match self.reader(descriptor) {
            Some(reader) => {
                let content = descriptor.options.content.as_deref().ok_or_else(|| {
                    Error::InvalidDescriptor(format!("app '{}' has no `content`", descriptor.id))
                })?;
                let content = descriptor.resolve_path(content, ctx);
                SpawnPlan::new(descriptor.resolve_exe(reader, ctx))
                    .args(descriptor.expanded_args(ctx))
                    .arg(content)
            }
            None => {
                let target = descriptor.resolve_path(open_target(descriptor)?, ctx);
                open_plan(&target, &descriptor.expanded_args(ctx), ctx)
            }
        };

        Ok(PlanOutcome::Ready(
            plan.current_dir(descriptor.working_directory(ctx))
                .envs(&descriptor.env),
        ))
    }

    fn uses_open_action(&self, descriptor: &LaunchDescriptor) -> bool {
        self.reader(descriptor).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::test_support::linux;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn document() -> LaunchDescriptor {
        let mut descriptor = LaunchDescriptor::new("manual", "unused");
        descriptor.exe = None;
        descriptor.options.content = Some("/srv/docs/manual.pdf".into());
        descriptor
    }

    #[test]
    fn reader_receives_args_then_content() {
        let mut descriptor = document();
        descriptor.options.reader_exe = Some("okular".into());
        descriptor.args = vec!["--presentation".into()];

        let PlanOutcome::Ready(plan) = ContentVariant::new()
            .build_spawn_plan(&descriptor, &linux())
            .unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(plan.executable, PathBuf::from("okular"));
        assert_eq!(plan.args, vec!["--presentation", "/srv/docs/manual.pdf"]);
        assert!(plan.options.capture_output);
    }

    #[test]
    fn default_reader_applies_when_unset() {
        let variant = ContentVariant::with_reader("pdf@evince", "evince");
        let PlanOutcome::Ready(plan) = variant.build_spawn_plan(&document(), &linux()).unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(variant.name(), "pdf@evince");
        assert_eq!(plan.executable, PathBuf::from("evince"));
        assert_eq!(plan.args, vec!["/srv/docs/manual.pdf"]);
    }

    #[test]
    fn without_reader_content_goes_to_the_os_handler() {
        let PlanOutcome::Ready(plan) = ContentVariant::new()
            .build_spawn_plan(&document(), &linux())
            .unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(plan.executable, PathBuf::from("xdg-open"));
        assert_eq!(plan.args, vec!["/srv/docs/manual.pdf"]);
        assert!(ContentVariant::new().uses_open_action(&document()));
    }

    #[test]
    fn reader_is_not_an_open_action() {
        let mut descriptor = document();
        descriptor.options.reader_exe = Some("okular".into());
        assert!(!ContentVariant::new().uses_open_action(&descriptor));
        assert!(!ContentVariant::with_reader("pdf@evince", "evince").uses_open_action(&document()));
    }

    #[test]
    fn reader_without_content_is_rejected() {
        let mut descriptor = document();
        descriptor.options.reader_exe = Some("okular".into());
        descriptor.options.content = None;

        assert!(matches!(
            ContentVariant::new().build_spawn_plan(&descriptor, &linux()),
            Err(Error::InvalidDescriptor(_))
        ));
    }
}
