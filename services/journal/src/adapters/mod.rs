pub mod chat_llm;
pub mod firestore;
pub mod house_ads;
pub mod memory_store;
pub mod settings;

pub use chat_llm::OpenAiChatAdapter;
pub use firestore::FirestoreAdapter;
pub use house_ads::{HeadlessHost, HouseAdNetwork};
pub use memory_store::InMemoryDocumentStore;
pub use settings::JsonFileSettings;
