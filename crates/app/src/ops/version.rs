use clap::Args;

use common::prelude::build_info;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let build = build_info();
        Ok(format!(
            "flowgate {} ({}, features: {}, built {})",
            build.version, build.build_profile, build.build_features, build.build_timestamp
        ))
    }
}
