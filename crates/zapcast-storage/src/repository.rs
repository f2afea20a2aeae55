//! Repository layer for data access

pub mod api_keys;
pub mod campaign_contacts;
pub mod campaign_state;
pub mod campaigns;
pub mod instances;

// Re-export concrete repository implementations with simple names
pub use api_keys::DbApiKeyRepository as ApiKeyRepository;
pub use campaign_contacts::CampaignContactRepository;
pub use campaign_state::DbCampaignStateStore;
pub use campaigns::CampaignRepository;
pub use instances::DbInstanceRepository as InstanceRepository;

// Re-export repository traits
pub use api_keys::ApiKeyRepository as ApiKeyRepositoryTrait;
pub use campaign_state::CampaignStateStore;
pub use instances::InstanceDirectory;

// Re-export API key types
pub use api_keys::ApiKey;
