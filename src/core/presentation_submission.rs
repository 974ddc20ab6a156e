use serde::{Deserialize, Serialize};

/// A DescriptorMapId is the id of the input descriptor a submitted credential satisfies.
pub type DescriptorMapId = String;

const VERIFIABLE_CREDENTIAL_PATH: &str = "$.verifiableCredential.";

/// Presentation Submissions express how the credentials inside a presentation satisfy the
/// input descriptors of the presentation definitions that requested them.
///
/// The wallet emits only the `descriptor_map`; relying parties correlate it against their own
/// definitions.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    pub fn new(descriptor_map: Vec<DescriptorMap>) -> Self {
        Self { descriptor_map }
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }

    pub fn into_descriptor_map(self) -> Vec<DescriptorMap> {
        self.descriptor_map
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor_map.is_empty()
    }
}

/// Descriptor Maps tie one input descriptor to one credential of the enclosing presentation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub path: String,
}

impl DescriptorMap {
    pub fn new(id: impl Into<DescriptorMapId>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Descriptor for the credential at `index` of the presentation's `verifiableCredential`.
    pub fn for_credential(id: impl Into<DescriptorMapId>, index: usize) -> Self {
        Self::new(id, format!("{VERIFIABLE_CREDENTIAL_PATH}[{index}]"))
    }

    /// The `verifiableCredential` index this descriptor points at, if its path has the
    /// `$.verifiableCredential.[i]` form.
    pub fn credential_index(&self) -> Option<usize> {
        self.path
            .strip_prefix(VERIFIABLE_CREDENTIAL_PATH)?
            .strip_prefix('[')?
            .strip_suffix(']')?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_descriptor_map_only() {
        let submission = PresentationSubmission::new(vec![
            DescriptorMap::for_credential("degree_input_1", 0),
            DescriptorMap::for_credential("citizenship_input_1", 1),
        ]);

        assert_eq!(
            serde_json::to_value(&submission).unwrap(),
            json!({
                "descriptor_map": [
                    { "id": "degree_input_1", "path": "$.verifiableCredential.[0]" },
                    { "id": "citizenship_input_1", "path": "$.verifiableCredential.[1]" }
                ]
            })
        );
    }

    #[test]
    fn credential_index() {
        assert_eq!(DescriptorMap::for_credential("a", 12).credential_index(), Some(12));
        assert_eq!(DescriptorMap::new("a", "$").credential_index(), None);
        assert_eq!(
            DescriptorMap::new("a", "$.verifiableCredential[0]").credential_index(),
            None
        );
    }
}
