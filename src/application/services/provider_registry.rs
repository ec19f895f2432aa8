//! Provider Registry - 合成后端注册表

use serde::Serialize;
use std::sync::Arc;

use crate::application::ports::TtsProviderPort;
use crate::domain::job::ValidationError;
use crate::domain::provider::{CircuitBreakerStore, CircuitSnapshot, ProviderDescriptor, ProviderKind};

/// 已注册的 provider
#[derive(Clone)]
pub struct RegisteredProvider {
    pub descriptor: ProviderDescriptor,
    pub client: Arc<dyn TtsProviderPort>,
}

impl RegisteredProvider {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// provider 状态（健康检查与管理接口使用）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub kind: ProviderKind,
    pub priority: u32,
    pub reachable: bool,
    pub available: bool,
    pub circuit: CircuitSnapshot,
}

/// Provider 注册表
///
/// 按 priority 升序保存 provider，priority 相同时保持注册顺序
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    breakers: Arc<CircuitBreakerStore>,
}

impl ProviderRegistry {
    pub fn new(breakers: Arc<CircuitBreakerStore>) -> Self {
        Self {
            providers: Vec::new(),
            breakers,
        }
    }

    pub fn register(
        mut self,
        descriptor: ProviderDescriptor,
        client: Arc<dyn TtsProviderPort>,
    ) -> Self {
        tracing::info!(
            provider = %descriptor.name,
            kind = %descriptor.kind,
            priority = descriptor.priority,
            reachable = descriptor.network_reachable,
            "Provider registered"
        );
        self.providers.push(RegisteredProvider { descriptor, client });
        self.providers.sort_by_key(|p| p.descriptor.priority);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerStore> {
        &self.breakers
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.descriptor.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter().map(|p| &p.descriptor)
    }

    /// 所有 provider 名字都必须已注册
    pub fn validate_preference(&self, preference: &[String]) -> Result<(), ValidationError> {
        match preference.iter().find(|name| !self.contains(name)) {
            Some(unknown) => Err(ValidationError::UnknownProvider(unknown.clone())),
            None => Ok(()),
        }
    }

    /// 候选 provider 列表
    ///
    /// 调用方指定的 provider 按其顺序排在前面，其余按 priority 兜底。
    /// 排除熔断中、服务端不可达以及文本超过上限的 provider。
    pub fn candidates(&self, preference: &[String], text_len: usize) -> Vec<RegisteredProvider> {
        let preferred = preference.iter().filter_map(|name| self.get(name));
        let rest = self
            .providers
            .iter()
            .filter(|p| !preference.contains(&p.descriptor.name));

        let mut seen = Vec::new();
        preferred
            .chain(rest)
            .filter(|p| {
                if seen.contains(&p.descriptor.name) {
                    return false;
                }
                seen.push(p.descriptor.name.clone());
                p.descriptor.accepts(text_len) && self.breakers.is_available(&p.descriptor.name)
            })
            .cloned()
            .collect()
    }

    /// 当前可以承接请求的 provider
    pub fn available_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| {
                p.descriptor.network_reachable && self.breakers.is_available(&p.descriptor.name)
            })
            .map(|p| p.descriptor.name.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| {
                let name = &p.descriptor.name;
                ProviderStatus {
                    name: name.clone(),
                    kind: p.descriptor.kind,
                    priority: p.descriptor.priority,
                    reachable: p.descriptor.network_reachable,
                    available: p.descriptor.network_reachable && self.breakers.is_available(name),
                    circuit: self.breakers.snapshot(name),
                }
            })
            .collect()
    }
}
