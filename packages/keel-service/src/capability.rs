use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use keel_domain::{Entity, EntityType, Lane};

use crate::{AuthContext, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Viewer,
	Technician,
	Supervisor,
	Auditor,
}

impl Role {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"viewer" => Some(Self::Viewer),
			"technician" => Some(Self::Technician),
			"supervisor" => Some(Self::Supervisor),
			"auditor" => Some(Self::Auditor),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
	Read,
	Mutate,
	Signed,
}

/// One registry entry as declared by the capability registry.
#[derive(Clone, Debug)]
pub struct CapabilitySpec {
	pub action_id: &'static str,
	pub variant: ActionVariant,
	pub allowed_roles: &'static [Role],
	pub requires_signature: bool,
	pub entity_types: &'static [EntityType],
	/// `None` means the capability is available to every tenant.
	pub tenant_scope: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
	pub action_id: String,
	pub variant: ActionVariant,
	pub allowed_roles: Vec<Role>,
	pub requires_signature: bool,
}

/// Typed lookup over the registry, resolved once at startup: declaration order is
/// preserved, and a per-entity-type index replaces any dispatch over action ids.
#[derive(Debug)]
pub struct CapabilityRegistry {
	specs: Vec<CapabilitySpec>,
	by_entity_type: HashMap<EntityType, Vec<usize>>,
}

impl CapabilityRegistry {
	pub fn new(specs: Vec<CapabilitySpec>) -> Result<Self> {
		let mut by_entity_type: HashMap<EntityType, Vec<usize>> = HashMap::new();
		let mut seen = std::collections::HashSet::new();

		for (index, spec) in specs.iter().enumerate() {
			if !seen.insert(spec.action_id) {
				return Err(Error::Registry {
					message: format!("Duplicate action id {}.", spec.action_id),
				});
			}
			if spec.allowed_roles.is_empty() {
				return Err(Error::Registry {
					message: format!("Action {} has an empty allowed-roles set.", spec.action_id),
				});
			}
			// Signed actions always restrict roles and always demand a signature.
			if spec.variant == ActionVariant::Signed && !spec.requires_signature {
				return Err(Error::Registry {
					message: format!(
						"Signed action {} must require a signature.",
						spec.action_id
					),
				});
			}
			if spec.variant != ActionVariant::Signed && spec.requires_signature {
				return Err(Error::Registry {
					message: format!(
						"Only signed actions may require a signature, got {}.",
						spec.action_id
					),
				});
			}

			for entity_type in spec.entity_types {
				by_entity_type.entry(*entity_type).or_default().push(index);
			}
		}

		Ok(Self { specs, by_entity_type })
	}

	pub fn builtin() -> Result<Self> {
		Self::new(builtin_specs())
	}

	pub fn len(&self) -> usize {
		self.specs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.specs.is_empty()
	}

	pub fn specs(&self) -> &[CapabilitySpec] {
		&self.specs
	}

	/// Map extracted entities to the caller's candidate actions. Actions the caller's
	/// role or tenant cannot see are omitted silently, so the response never reveals
	/// which capabilities exist for other roles.
	pub fn candidate_actions(
		&self,
		entities: &[Entity],
		lane: Lane,
		auth: &AuthContext,
	) -> Vec<CandidateAction> {
		if lane == Lane::Blocked {
			return Vec::new();
		}

		let mut indices: Vec<usize> = Vec::new();

		for entity in entities {
			let Some(matched) = self.by_entity_type.get(&entity.entity_type) else {
				continue;
			};

			for index in matched {
				if !indices.contains(index) {
					indices.push(*index);
				}
			}
		}

		// Registry declaration order, independent of entity order.
		indices.sort_unstable();

		indices
			.into_iter()
			.map(|index| &self.specs[index])
			.filter(|spec| spec.allowed_roles.contains(&auth.role))
			.filter(|spec| {
				spec.tenant_scope.map(|tenant| tenant == auth.tenant_id).unwrap_or(true)
			})
			.map(|spec| CandidateAction {
				action_id: spec.action_id.to_string(),
				variant: spec.variant,
				allowed_roles: spec.allowed_roles.to_vec(),
				requires_signature: spec.requires_signature,
			})
			.collect()
	}
}

const ALL_ROLES: &[Role] = &[Role::Viewer, Role::Technician, Role::Supervisor, Role::Auditor];
const MAINTAINERS: &[Role] = &[Role::Technician, Role::Supervisor];
const SUPERVISORS: &[Role] = &[Role::Supervisor];

fn builtin_specs() -> Vec<CapabilitySpec> {
	vec![
		CapabilitySpec {
			action_id: "view_work_order_history",
			variant: ActionVariant::Read,
			allowed_roles: ALL_ROLES,
			requires_signature: false,
			entity_types: &[EntityType::Equipment, EntityType::WorkOrder],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "view_fault_log",
			variant: ActionVariant::Read,
			allowed_roles: ALL_ROLES,
			requires_signature: false,
			entity_types: &[EntityType::Equipment, EntityType::FaultCode],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "view_part_stock",
			variant: ActionVariant::Read,
			allowed_roles: MAINTAINERS,
			requires_signature: false,
			entity_types: &[EntityType::Part, EntityType::Equipment],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "create_work_order",
			variant: ActionVariant::Mutate,
			allowed_roles: MAINTAINERS,
			requires_signature: false,
			entity_types: &[EntityType::Equipment, EntityType::FaultCode, EntityType::Symptom],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "log_fault",
			variant: ActionVariant::Mutate,
			allowed_roles: MAINTAINERS,
			requires_signature: false,
			entity_types: &[EntityType::Equipment, EntityType::FaultCode, EntityType::Symptom],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "order_part",
			variant: ActionVariant::Mutate,
			allowed_roles: SUPERVISORS,
			requires_signature: false,
			entity_types: &[EntityType::Part],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "close_work_order",
			variant: ActionVariant::Signed,
			allowed_roles: SUPERVISORS,
			requires_signature: true,
			entity_types: &[EntityType::WorkOrder],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "sign_off_maintenance",
			variant: ActionVariant::Signed,
			allowed_roles: SUPERVISORS,
			requires_signature: true,
			entity_types: &[EntityType::Equipment, EntityType::WorkOrder],
			tenant_scope: None,
		},
		CapabilitySpec {
			action_id: "decommission_equipment",
			variant: ActionVariant::Signed,
			allowed_roles: SUPERVISORS,
			requires_signature: true,
			entity_types: &[EntityType::Equipment],
			tenant_scope: None,
		},
	]
}
