use crate::config::toml_config::TopicConfigurationProperty;
use crate::domain::model::FetchTopic;
use serde::{Deserialize, Serialize};

/// Fetch filters for one topic subscription.
///
/// A handler declares one of these through
/// [`ExternalTaskHandler::subscription`](crate::domain::ports::ExternalTaskHandler::subscription);
/// configuration properties for the same topic are layered on top with
/// [`TopicConfiguration::override_with`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicConfiguration {
    pub topic_name: String,
    pub lock_duration: Option<u64>,
    pub variables: Option<Vec<String>>,
    pub local_variables: Option<bool>,
    pub business_key: Option<String>,
    pub process_definition_id: Option<String>,
    pub process_definition_id_in: Option<Vec<String>>,
    pub process_definition_key: Option<String>,
    pub process_definition_key_in: Option<Vec<String>>,
    pub process_definition_version_tag: Option<String>,
    pub without_tenant_id: Option<bool>,
    pub tenant_id_in: Option<Vec<String>>,
    pub include_extension_properties: Option<bool>,
}

fn to_strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

/// 第一個元素為空字串的清單視為未設定
fn normalize_list(list: Option<Vec<String>>) -> Option<Vec<String>> {
    match list {
        Some(values) if values.first().map(|v| v.is_empty()).unwrap_or(true) => None,
        other => other,
    }
}

impl TopicConfiguration {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            ..Default::default()
        }
    }

    pub fn with_lock_duration(mut self, lock_duration: u64) -> Self {
        self.lock_duration = Some(lock_duration);
        self
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(to_strings(variables));
        self
    }

    pub fn with_local_variables(mut self, local_variables: bool) -> Self {
        self.local_variables = Some(local_variables);
        self
    }

    pub fn with_business_key(mut self, business_key: impl Into<String>) -> Self {
        self.business_key = Some(business_key.into());
        self
    }

    pub fn with_process_definition_id(mut self, id: impl Into<String>) -> Self {
        self.process_definition_id = Some(id.into());
        self
    }

    pub fn with_process_definition_id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_definition_id_in = Some(to_strings(ids));
        self
    }

    pub fn with_process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn with_process_definition_key_in<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_definition_key_in = Some(to_strings(keys));
        self
    }

    pub fn with_process_definition_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.process_definition_version_tag = Some(tag.into());
        self
    }

    pub fn with_without_tenant_id(mut self) -> Self {
        self.without_tenant_id = Some(true);
        self
    }

    pub fn with_tenant_id_in<I, S>(mut self, tenant_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tenant_id_in = Some(to_strings(tenant_ids));
        self
    }

    pub fn with_include_extension_properties(mut self, include: bool) -> Self {
        self.include_extension_properties = Some(include);
        self
    }

    /// Drops placeholder values: lists whose first entry is empty, and a
    /// `without_tenant_id` that is not `true`.
    pub fn normalized(mut self) -> Self {
        self.variables = normalize_list(self.variables);
        self.process_definition_id_in = normalize_list(self.process_definition_id_in);
        self.process_definition_key_in = normalize_list(self.process_definition_key_in);
        self.tenant_id_in = normalize_list(self.tenant_id_in);
        if self.without_tenant_id != Some(true) {
            self.without_tenant_id = None;
        }
        self
    }

    /// Layers externally configured values over the declared ones.
    pub fn override_with(&mut self, property: &TopicConfigurationProperty) {
        if property.lock_duration.is_some() {
            self.lock_duration = property.lock_duration;
        }
        if property.variables.is_some() {
            self.variables = property.variables.clone();
        }
        if property.local_variables.is_some() {
            self.local_variables = property.local_variables;
        }
        if property.business_key.is_some() {
            self.business_key = property.business_key.clone();
        }
        if property.process_definition_id.is_some() {
            self.process_definition_id = property.process_definition_id.clone();
        }
        if property.process_definition_id_in.is_some() {
            self.process_definition_id_in = property.process_definition_id_in.clone();
        }
        if property.process_definition_key.is_some() {
            self.process_definition_key = property.process_definition_key.clone();
        }
        if property.process_definition_key_in.is_some() {
            self.process_definition_key_in = property.process_definition_key_in.clone();
        }
        if property.process_definition_version_tag.is_some() {
            self.process_definition_version_tag = property.process_definition_version_tag.clone();
        }
        if property.without_tenant_id == Some(true) {
            self.without_tenant_id = Some(true);
        }
        if property.tenant_id_in.is_some() {
            self.tenant_id_in = property.tenant_id_in.clone();
        }
        if property.include_extension_properties == Some(true) {
            self.include_extension_properties = Some(true);
        }
    }

    /// Merges another configuration: set values of `other` win, unset ones
    /// keep the current value.
    pub fn override_if_exists(&mut self, other: &TopicConfiguration) {
        if !other.topic_name.is_empty() {
            self.topic_name = other.topic_name.clone();
        }
        self.lock_duration = other.lock_duration.or(self.lock_duration);
        self.variables = other.variables.clone().or_else(|| self.variables.take());
        if other.local_variables == Some(true) {
            self.local_variables = Some(true);
        }
        self.business_key = other.business_key.clone().or_else(|| self.business_key.take());
        self.process_definition_id = other
            .process_definition_id
            .clone()
            .or_else(|| self.process_definition_id.take());
        self.process_definition_id_in = other
            .process_definition_id_in
            .clone()
            .or_else(|| self.process_definition_id_in.take());
        self.process_definition_key = other
            .process_definition_key
            .clone()
            .or_else(|| self.process_definition_key.take());
        self.process_definition_key_in = other
            .process_definition_key_in
            .clone()
            .or_else(|| self.process_definition_key_in.take());
        self.process_definition_version_tag = other
            .process_definition_version_tag
            .clone()
            .or_else(|| self.process_definition_version_tag.take());
        if other.without_tenant_id == Some(true) {
            self.without_tenant_id = Some(true);
        }
        self.tenant_id_in = other.tenant_id_in.clone().or_else(|| self.tenant_id_in.take());
        if other.include_extension_properties == Some(true) {
            self.include_extension_properties = Some(true);
        }
    }

    pub fn to_fetch_topic(&self, default_lock_duration: u64) -> FetchTopic {
        FetchTopic {
            topic_name: self.topic_name.clone(),
            lock_duration: self.lock_duration.unwrap_or(default_lock_duration),
            variables: self.variables.clone(),
            local_variables: self.local_variables,
            business_key: self.business_key.clone(),
            process_definition_id: self.process_definition_id.clone(),
            process_definition_id_in: self.process_definition_id_in.clone(),
            process_definition_key: self.process_definition_key.clone(),
            process_definition_key_in: self.process_definition_key_in.clone(),
            process_definition_version_tag: self.process_definition_version_tag.clone(),
            without_tenant_id: self.without_tenant_id.filter(|v| *v),
            tenant_id_in: self.tenant_id_in.clone(),
            include_extension_properties: self.include_extension_properties,
        }
    }
}

impl From<&TopicConfigurationProperty> for TopicConfiguration {
    fn from(property: &TopicConfigurationProperty) -> Self {
        let mut configuration = TopicConfiguration::new(property.topic_name.clone());
        configuration.override_with(property);
        configuration.local_variables = property.local_variables;
        configuration.include_extension_properties = property.include_extension_properties;
        configuration
    }
}
