//! MutatingWebhookConfiguration registration

use crate::config::WebhookSettings;
use anyhow::{Context, Result};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::info;

const FIELD_MANAGER: &str = "admission-controller";

/// Webhook configuration routing Pod CREATE reviews to this service
pub fn build_webhook_configuration(
    settings: &WebhookSettings,
    ca_bundle: Vec<u8>,
) -> MutatingWebhookConfiguration {
    let webhook = MutatingWebhook {
        name: format!(
            "pods.{}.{}.svc",
            settings.service_name, settings.service_namespace
        ),
        admission_review_versions: vec!["v1beta1".to_string(), "v1".to_string()],
        client_config: WebhookClientConfig {
            ca_bundle: Some(ByteString(ca_bundle)),
            service: Some(ServiceReference {
                name: settings.service_name.clone(),
                namespace: settings.service_namespace.clone(),
                path: Some(settings.path.clone()),
                port: Some(settings.service_port),
            }),
            url: None,
        },
        rules: Some(vec![RuleWithOperations {
            api_groups: Some(vec![String::new()]),
            api_versions: Some(vec!["v1".to_string()]),
            operations: Some(vec!["CREATE".to_string()]),
            resources: Some(vec!["pods".to_string()]),
            scope: None,
        }]),
        failure_policy: Some(settings.failure_policy.clone()),
        side_effects: "None".to_string(),
        timeout_seconds: Some(settings.timeout_seconds),
        ..Default::default()
    };

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(settings.name.clone()),
            ..Default::default()
        },
        webhooks: Some(vec![webhook]),
    }
}

/// Create or update the webhook configuration with server-side apply
pub async fn register(client: Client, settings: &WebhookSettings) -> Result<()> {
    let ca_bundle = tokio::fs::read(&settings.ca_bundle_file)
        .await
        .with_context(|| {
            format!(
                "Failed to read webhook CA bundle from {:?}",
                settings.ca_bundle_file
            )
        })?;
    let configuration = build_webhook_configuration(settings, ca_bundle);

    let api: Api<MutatingWebhookConfiguration> = Api::all(client);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&settings.name, &params, &Patch::Apply(&configuration))
        .await
        .with_context(|| format!("Failed to apply MutatingWebhookConfiguration {}", settings.name))?;

    info!(
        name = %settings.name,
        service = %settings.service_name,
        namespace = %settings.service_namespace,
        "Registered mutating webhook configuration"
    );
    Ok(())
}
