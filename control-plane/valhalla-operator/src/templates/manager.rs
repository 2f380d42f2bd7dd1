use super::{
    BuildContext, CronJobBuilder, DeploymentBuilder, HpaBuilder, JobBuilder,
    PdbBuilder, PvcBuilder, ResourceBuilder, ServiceBuilder, TemplateError,
};
use crate::controller::fsm::ChildSnapshot;
use crate::kinds::ManagedKind;

/// Static registry of builders for one instance, in dependency order.
pub struct ResourcePlanner<'a> {
    builders: Vec<Box<dyn ResourceBuilder + 'a>>,
}

impl<'a> ResourcePlanner<'a> {
    /// Validate the instance spec and assemble the fixed builder list.
    pub fn for_instance(ctx: BuildContext<'a>) -> Result<Self, TemplateError> {
        ctx.instance.spec.validate()?;
        let builders: Vec<Box<dyn ResourceBuilder + 'a>> = vec![
            Box::new(PvcBuilder::new(ctx)),
            Box::new(JobBuilder::new(ctx)),
            Box::new(DeploymentBuilder::new(ctx)),
            Box::new(ServiceBuilder::new(ctx)),
            Box::new(HpaBuilder::new(ctx)),
            Box::new(PdbBuilder::new(ctx)),
            Box::new(CronJobBuilder::new(ctx)),
        ];
        Ok(Self { builders })
    }

    pub fn builders(&self) -> impl Iterator<Item = &dyn ResourceBuilder> {
        self.builders.iter().map(|b| b.as_ref() as &dyn ResourceBuilder)
    }

    /// Builders whose gate passes for `snapshot`, in registry order.
    pub fn plan<'s>(
        &'s self,
        snapshot: &ChildSnapshot,
    ) -> Vec<&'s dyn ResourceBuilder> {
        self.builders()
            .filter(|b| b.should_deploy(snapshot))
            .collect()
    }

    pub fn kinds(&self) -> Vec<ManagedKind> {
        self.builders().map(|b| b.kind()).collect()
    }
}
