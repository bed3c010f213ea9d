//! Runtime skeleton: immutable joint hierarchy shared by every controller using it.

use glam::Mat4;

/// A bone is a joint that influences skinned vertices — it has a palette slot
/// and an inverse bind matrix.
#[derive(Debug, Clone, Copy)]
pub struct Bone {
    pub index: u32,
}

/// One node in the skeleton hierarchy.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub parent_index: Option<u32>,
    pub children: Vec<u32>,
    pub local_bind: Mat4,
    pub is_animated: bool,
    pub bone: Option<Bone>,
    /// Index into the animated-joint-only pose arrays the blend queue writes, if animated.
    pub skeleton_transform_index: Option<u32>,
}

/// Immutable per-model joint tree, shared by every `Controller` that animates it.
pub struct Skeleton {
    pub nodes: Vec<Joint>,
    pub root_index: u32,
    /// Node index for each bone, indexed by bone index.
    pub bone_nodes: Vec<u32>,
    pub global_inverse_transform: Mat4,
    pub inverse_bind_pose: Vec<Mat4>,
}

impl Skeleton {
    /// Build a skeleton from a flat joint list (parent indices must precede children).
    ///
    /// The inverse bind pose is the inverse of each bone's *world*-space bind
    /// transform, not its local one — computed here by walking the hierarchy
    /// once in index order (parents are required to precede children).
    pub fn new(nodes: Vec<Joint>, global_inverse_transform: Mat4) -> Self {
        let root_index = nodes
            .iter()
            .position(|j| j.parent_index.is_none())
            .expect("skeleton must have exactly one root") as u32;

        let mut world_bind = vec![Mat4::IDENTITY; nodes.len()];
        for (node_index, joint) in nodes.iter().enumerate() {
            world_bind[node_index] = match joint.parent_index {
                Some(p) => world_bind[p as usize] * joint.local_bind,
                None => joint.local_bind,
            };
        }

        let bone_count = nodes.iter().filter(|j| j.bone.is_some()).count();
        let mut bone_nodes = vec![0u32; bone_count];
        let mut inverse_bind_pose = vec![Mat4::IDENTITY; bone_count];
        for (node_index, joint) in nodes.iter().enumerate() {
            if let Some(bone) = joint.bone {
                bone_nodes[bone.index as usize] = node_index as u32;
                inverse_bind_pose[bone.index as usize] = world_bind[node_index].inverse();
            }
        }

        Self {
            nodes,
            root_index,
            bone_nodes,
            global_inverse_transform,
            inverse_bind_pose,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bone_count(&self) -> usize {
        self.bone_nodes.len()
    }

    pub fn num_animated_joints(&self) -> usize {
        self.nodes.iter().filter(|j| j.is_animated).count()
    }

    pub fn root(&self) -> &Joint {
        &self.nodes[self.root_index as usize]
    }

    pub fn node(&self, index: u32) -> Option<&Joint> {
        self.nodes.get(index as usize)
    }

    /// Checks §3's invariants the constructor doesn't already enforce by
    /// panicking: every `skeleton_transform_index` is in range and unique,
    /// and every `bone.index` is in range and unique. A host loading a
    /// skeleton from an untrusted asset (rather than building one by hand in
    /// code, as every test here does) should call this once after
    /// `Skeleton::new` and surface a failure as spec §6's
    /// `InvalidSkeletonIndex`.
    pub fn validate(&self) -> flint_core::Result<()> {
        let animated = self.num_animated_joints() as u32;
        let mut seen_transform_indices = vec![false; animated as usize];
        let mut seen_bone_indices = vec![false; self.bone_count()];

        for joint in &self.nodes {
            if let Some(ti) = joint.skeleton_transform_index {
                if ti >= animated || std::mem::replace(&mut seen_transform_indices[ti as usize], true) {
                    return Err(flint_core::FlintError::InvalidSkeletonIndex(ti));
                }
            }
            if let Some(bone) = joint.bone {
                if bone.index as usize >= self.bone_count()
                    || std::mem::replace(&mut seen_bone_indices[bone.index as usize], true)
                {
                    return Err(flint_core::FlintError::InvalidSkeletonIndex(bone.index));
                }
            }
        }
        Ok(())
    }

    pub fn identity_pose(&self, out: &mut Vec<Mat4>) {
        out.clear();
        out.resize(self.bone_count(), Mat4::IDENTITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_joint_skeleton() -> Skeleton {
        let nodes = vec![
            Joint {
                name: "root".into(),
                parent_index: None,
                children: vec![1],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                bone: Some(Bone { index: 0 }),
                skeleton_transform_index: Some(0),
            },
            Joint {
                name: "child".into(),
                parent_index: Some(0),
                children: vec![],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                bone: Some(Bone { index: 1 }),
                skeleton_transform_index: Some(1),
            },
        ];
        Skeleton::new(nodes, Mat4::IDENTITY)
    }

    #[test]
    fn bone_count_matches_bone_nodes() {
        let skel = two_joint_skeleton();
        assert_eq!(skel.bone_count(), 2);
        assert_eq!(skel.bone_nodes, vec![0, 1]);
    }

    #[test]
    fn root_has_no_parent() {
        let skel = two_joint_skeleton();
        assert!(skel.root().parent_index.is_none());
    }

    #[test]
    fn inverse_bind_pose_uses_world_not_local_transform() {
        use glam::Vec3;

        let nodes = vec![
            Joint {
                name: "root".into(),
                parent_index: None,
                children: vec![1],
                local_bind: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
                is_animated: true,
                bone: Some(Bone { index: 0 }),
                skeleton_transform_index: Some(0),
            },
            Joint {
                name: "child".into(),
                parent_index: Some(0),
                children: vec![],
                local_bind: Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
                is_animated: true,
                bone: Some(Bone { index: 1 }),
                skeleton_transform_index: Some(1),
            },
        ];
        let skel = Skeleton::new(nodes, Mat4::IDENTITY);

        // child's world bind translation is (3, 0, 0), not its local (2, 0, 0).
        let world_child = skel.nodes[0].local_bind * skel.nodes[1].local_bind;
        let round_trip = world_child * skel.inverse_bind_pose[1];
        assert!(round_trip.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn identity_pose_sized_by_bone_count() {
        let skel = two_joint_skeleton();
        let mut pose = Vec::new();
        skel.identity_pose(&mut pose);
        assert_eq!(pose.len(), 2);
        assert!(pose.iter().all(|m| *m == Mat4::IDENTITY));
    }

    #[test]
    fn validate_accepts_well_formed_skeleton() {
        let skel = two_joint_skeleton();
        assert!(skel.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_skeleton_transform_index() {
        let nodes = vec![
            Joint {
                name: "root".into(),
                parent_index: None,
                children: vec![1],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                bone: Some(Bone { index: 0 }),
                skeleton_transform_index: Some(0),
            },
            Joint {
                name: "child".into(),
                parent_index: Some(0),
                children: vec![],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                bone: Some(Bone { index: 1 }),
                // duplicate of the root's index - invalid.
                skeleton_transform_index: Some(0),
            },
        ];
        let skel = Skeleton::new(nodes, Mat4::IDENTITY);
        assert!(matches!(skel.validate(), Err(flint_core::FlintError::InvalidSkeletonIndex(0))));
    }

    #[test]
    fn validate_rejects_duplicate_bone_index() {
        let nodes = vec![
            Joint {
                name: "root".into(),
                parent_index: None,
                children: vec![1],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                bone: Some(Bone { index: 0 }),
                skeleton_transform_index: Some(0),
            },
            Joint {
                name: "child".into(),
                parent_index: Some(0),
                children: vec![],
                local_bind: Mat4::IDENTITY,
                is_animated: true,
                // duplicate of the root's bone index - invalid.
                bone: Some(Bone { index: 0 }),
                skeleton_transform_index: Some(1),
            },
        ];
        let skel = Skeleton::new(nodes, Mat4::IDENTITY);
        assert!(matches!(skel.validate(), Err(flint_core::FlintError::InvalidSkeletonIndex(0))));
    }
}
