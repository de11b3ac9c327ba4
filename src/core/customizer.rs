use crate::config::toml_config::Environment;
use crate::core::builder::ExternalTaskClientBuilder;

/// Last-chance hook on the builder, applied after configuration has been
/// read and before the client is built.
pub trait ClientCustomizer: Send + Sync {
    fn customize(&self, builder: &mut ExternalTaskClientBuilder);
}

/// Production customizer: leaves the builder as configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientCustomizer;

impl ClientCustomizer for DefaultClientCustomizer {
    fn customize(&self, _builder: &mut ExternalTaskClientBuilder) {}
}

/// Customizer for test environments: fetches in arrival order instead of
/// by priority. Touches nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonPriorityCustomizer;

impl ClientCustomizer for NonPriorityCustomizer {
    fn customize(&self, builder: &mut ExternalTaskClientBuilder) {
        builder.use_priority(false);
    }
}

impl<F> ClientCustomizer for F
where
    F: Fn(&mut ExternalTaskClientBuilder) + Send + Sync,
{
    fn customize(&self, builder: &mut ExternalTaskClientBuilder) {
        self(builder)
    }
}

pub fn customizer_for(environment: Environment) -> Box<dyn ClientCustomizer> {
    match environment {
        Environment::Production => Box::new(DefaultClientCustomizer),
        Environment::Test => Box::new(NonPriorityCustomizer),
    }
}
