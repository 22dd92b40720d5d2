use std::task::{Context, Poll};

use crate::{
    domain::{Member, MemberPatch, PointRecord},
    ports::{blob_store::BlobStorePort, database::DatabasePort, database::Transaction},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use super::{run_transaction, BoxFuture, DomainLogic, Error, TransactionScript};

/// Public view of a member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub member_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<Member> for MemberView {
    fn from(member: Member) -> Self {
        Self {
            member_id: member.member_id,
            points: member.points(),
            name: member.name,
            email: member.email,
            created_at: member.created_at,
            modified_at: member.modified_at,
        }
    }
}

/// Register a member under an identifier vouched for by the identity provider
///
/// New members start with no points.
pub struct CreateMemberRequest {
    pub member_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

pub struct FindMemberRequest {
    pub member_id: Uuid,
}

pub struct UpdateMemberRequest {
    pub member_id: Uuid,
    pub patch: MemberPatch,
}

pub struct DeleteMemberRequest {
    pub member_id: Uuid,
}

/// Credit points to a member, keeping a record of why
pub struct GrantPointsRequest {
    pub member_id: Uuid,
    pub points: u32,
    pub reason: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPointsResponse {
    pub member_id: Uuid,
    /// Previous number of points
    pub old_points: u32,
    /// New number of points
    pub new_points: u32,
}

pub struct PointHistoryRequest {
    pub member_id: Uuid,
}

impl<D, B> Service<CreateMemberRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = MemberView;
    type Error = Error;
    type Future = BoxFuture<MemberView>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateMemberRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::info_span!("create_member", member_id = %req.member_id);
        Box::pin(
            async move {
                if req.name.trim().is_empty() {
                    return Err(Error::InvalidInput("name cannot be empty".into()));
                }

                let member = database
                    .insert_member(Member::new(req.member_id, req.name, req.email, 0))
                    .await?;
                tracing::info!("member created");
                Ok(member.into())
            }
            .instrument(span),
        )
    }
}

impl<D, B> Service<FindMemberRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = MemberView;
    type Error = Error;
    type Future = BoxFuture<MemberView>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: FindMemberRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let member = database.get_member(req.member_id).await?;
            Ok(member.into())
        })
    }
}

#[async_trait::async_trait]
impl TransactionScript for UpdateMemberRequest {
    type Output = Member;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Member, Error> {
        let member = tx.member(self.member_id).await?.with_patch(&self.patch);
        tx.put_member(member.clone());
        Ok(member)
    }
}

impl<D, B> Service<UpdateMemberRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = MemberView;
    type Error = Error;
    type Future = BoxFuture<MemberView>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UpdateMemberRequest) -> Self::Future {
        let database = self.database.clone();
        let max_attempts = self.settings.max_transaction_attempts;
        let span = tracing::info_span!("update_member", member_id = %req.member_id);
        Box::pin(
            async move {
                if matches!(&req.patch.name, Some(name) if name.trim().is_empty()) {
                    return Err(Error::InvalidInput("name cannot be empty".into()));
                }

                let member = run_transaction(database.as_ref(), max_attempts, &req).await?;
                tracing::info!("member updated");
                Ok(member.into())
            }
            .instrument(span),
        )
    }
}

impl<D, B> Service<DeleteMemberRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = ();
    type Error = Error;
    type Future = BoxFuture<()>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DeleteMemberRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            // Remaining points are forfeited
            database.delete_member(req.member_id).await?;
            tracing::info!(member_id = %req.member_id, "member deleted");
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl TransactionScript for GrantPointsRequest {
    type Output = GrantPointsResponse;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<GrantPointsResponse, Error> {
        let delta_points = i32::try_from(self.points)
            .map_err(|_| Error::InvalidInput("too many points in a single grant".into()))?;
        let member = tx.member(self.member_id).await?;
        let old_points = member.points();
        let member = member
            .credit(self.points)
            .map_err(|err| Error::InvalidInput(err.to_string().into()))?;

        let response = GrantPointsResponse {
            member_id: member.member_id,
            old_points,
            new_points: member.points(),
        };
        tx.append_point_record(PointRecord::new(
            self.member_id,
            delta_points,
            self.reason.clone(),
        ));
        tx.put_member(member);

        Ok(response)
    }
}

impl<D, B> Service<GrantPointsRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = GrantPointsResponse;
    type Error = Error;
    type Future = BoxFuture<GrantPointsResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GrantPointsRequest) -> Self::Future {
        let database = self.database.clone();
        let max_attempts = self.settings.max_transaction_attempts;
        let span = tracing::info_span!(
            "grant_points",
            member_id = %req.member_id,
            points = req.points,
        );
        Box::pin(
            async move {
                if req.points == 0 {
                    return Err(Error::InvalidInput("points must be positive".into()));
                }

                let res = run_transaction(database.as_ref(), max_attempts, &req).await?;
                tracing::info!(new_points = res.new_points, "points granted");
                Ok(res)
            }
            .instrument(span),
        )
    }
}

impl<D, B> Service<PointHistoryRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = Vec<PointRecord>;
    type Error = Error;
    type Future = BoxFuture<Vec<PointRecord>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PointHistoryRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            // Distinguish "no history" from "no member"
            database.get_member(req.member_id).await?;
            let records = database.get_point_records(req.member_id).await?;
            Ok(records)
        })
    }
}
