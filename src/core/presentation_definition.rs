use super::input_descriptor::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A presentation definition is a JSON object that describes the information a relying party
/// requires of a holder.
///
/// Presentation Definitions are composed of inputs, which describe the forms and details of the
/// proofs they require.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Json>,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property and at least one
    /// [InputDescriptor].
    pub fn new(id: impl Into<String>, input_descriptor: InputDescriptor) -> Self {
        Self {
            id: id.into(),
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    /// Set the name of the presentation definition.
    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Return the name of the presentation definition.
    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the purpose of the presentation definition.
    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    /// Return the purpose of the presentation definition.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Return the claim format constraints, left uninterpreted.
    pub fn format(&self) -> Option<&Json> {
        self.format.as_ref()
    }

    /// Whether at least one input descriptor must be satisfied by a submission.
    pub fn is_required(&self) -> bool {
        self.input_descriptors.iter().any(InputDescriptor::is_required)
    }

    /// Position of an input descriptor within the definition.
    pub fn descriptor_position(&self, descriptor_id: &str) -> Option<usize> {
        self.input_descriptors
            .iter()
            .position(|descriptor| descriptor.id() == descriptor_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_citizenship_and_degree_definition() {
        let definition: PresentationDefinition = serde_json::from_value(json!({
            "id": "32f54163-7166-48f1-93d8-ff217bdb0653",
            "input_descriptors": [
                {
                    "id": "degree_input_1",
                    "name": "University degree",
                    "constraints": { "fields": [ { "path": ["$.credentialSubject.degree.type"] } ] }
                },
                {
                    "id": "citizenship_input_1",
                    "constraints": { "fields": [ { "path": ["$.credentialSubject.lprCategory"] } ] }
                }
            ]
        }))
        .unwrap();

        assert_eq!(definition.input_descriptors().len(), 2);
        assert_eq!(definition.descriptor_position("citizenship_input_1"), Some(1));
        assert!(definition.is_required());
    }
}
