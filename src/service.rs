use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::proto::v1 as pb;
use crate::rates::engine::RateEngine;
use crate::rates::{MinerFees, PairId, PairInfo, RateError};
use crate::status::SwapUpdate;
use crate::status::distributor::{StatusDistributor, StatusError, SubscriptionHandle};

#[derive(Clone)]
pub struct ExchangeServiceImpl {
    rates: Arc<RateEngine>,
    statuses: Arc<StatusDistributor>,
}

impl ExchangeServiceImpl {
    pub fn new(rates: Arc<RateEngine>, statuses: Arc<StatusDistributor>) -> Self {
        Self { rates, statuses }
    }

    fn pair_to_proto(info: &PairInfo) -> pb::Pair {
        let fees = info.fees();
        let limits = info.limits();
        pb::Pair {
            id: info.id().to_string(),
            hash: info.hash().to_string(),
            rate: info.rate(),
            limits: Some(pb::Limits {
                minimal: limits.minimal,
                maximal: limits.maximal,
                maximal_zero_conf_base: limits.maximal_zero_conf.base_asset,
                maximal_zero_conf_quote: limits.maximal_zero_conf.quote_asset,
            }),
            fees: Some(pb::Fees {
                percentage: fees.percentage,
                base_asset: Some(Self::miner_fees_to_proto(&fees.miner_fees.base_asset)),
                quote_asset: Some(Self::miner_fees_to_proto(&fees.miner_fees.quote_asset)),
            }),
        }
    }

    fn miner_fees_to_proto(fees: &MinerFees) -> pb::MinerFees {
        pb::MinerFees {
            normal: fees.normal,
            reverse_lockup: fees.reverse.lockup,
            reverse_claim: fees.reverse.claim,
        }
    }

    fn parse_swap_id(swap_id: &str) -> Result<&str, Status> {
        let swap_id = swap_id.trim();
        if swap_id.is_empty() {
            return Err(Status::invalid_argument("swap_id is required"));
        }
        Ok(swap_id)
    }
}

pub fn update_to_proto(swap_id: &str, update: &SwapUpdate) -> pb::SwapStatusUpdate {
    pb::SwapStatusUpdate {
        swap_id: swap_id.to_string(),
        status: update.status.as_str().to_string(),
        channel: update.channel.as_ref().map(|c| pb::Channel {
            funding_transaction_id: c.funding_transaction_id.clone(),
            funding_transaction_vout: c.funding_transaction_vout,
        }),
        zero_conf_rejected: update.zero_conf_rejected,
        failure_reason: update.failure_reason.clone(),
        transaction: update.transaction.as_ref().map(|t| pb::Transaction {
            id: t.id.clone(),
            hex: t.hex.clone(),
            eta: t.eta,
        }),
    }
}

pub fn rate_error_to_status(err: RateError) -> Status {
    match err {
        RateError::InvalidPairId(_) => Status::invalid_argument(err.to_string()),
        RateError::UnknownPair(_) | RateError::UnknownCurrencySymbol(_) => {
            Status::not_found(err.to_string())
        }
        RateError::StaleHash(_) => Status::failed_precondition(err.to_string()),
        RateError::PairNotTradable(_) => Status::unavailable(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

fn status_error_to_status(err: StatusError) -> Status {
    match err {
        StatusError::NotFound(_) => Status::not_found(err.to_string()),
        StatusError::BusClosed => Status::unavailable(err.to_string()),
    }
}

/// Server stream for one subscription. Yields the cached status first and
/// unsubscribes when the client goes away.
pub struct SwapStatusStream {
    swap_id: String,
    handle: SubscriptionHandle,
    first: Option<SwapUpdate>,
    updates: ReceiverStream<SwapUpdate>,
    statuses: Arc<StatusDistributor>,
}

impl Stream for SwapStatusStream {
    type Item = Result<pb::SwapStatusUpdate, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(first) = this.first.take() {
            return Poll::Ready(Some(Ok(update_to_proto(&this.swap_id, &first))));
        }
        Pin::new(&mut this.updates)
            .poll_next(cx)
            .map(|update| update.map(|u| Ok(update_to_proto(&this.swap_id, &u))))
    }
}

impl Drop for SwapStatusStream {
    fn drop(&mut self) {
        self.statuses.unsubscribe(&self.swap_id, self.handle);
    }
}

#[tonic::async_trait]
impl pb::exchange_service_server::ExchangeService for ExchangeServiceImpl {
    type StreamSwapStatusStream = SwapStatusStream;

    async fn get_pairs(
        &self,
        _request: Request<pb::GetPairsRequest>,
    ) -> Result<Response<pb::GetPairsResponse>, Status> {
        let pairs = self
            .rates
            .get_pairs()
            .iter()
            .map(|info| Self::pair_to_proto(info))
            .collect();
        Ok(Response::new(pb::GetPairsResponse { pairs }))
    }

    async fn verify_pair_hash(
        &self,
        request: Request<pb::VerifyPairHashRequest>,
    ) -> Result<Response<pb::VerifyPairHashResponse>, Status> {
        let req = request.into_inner();
        if req.hash.trim().is_empty() {
            return Err(Status::invalid_argument("hash is required"));
        }
        let pair: PairId = req.pair_id.parse().map_err(rate_error_to_status)?;

        self.rates
            .verify_pair_hash(&pair, &req.hash)
            .map_err(rate_error_to_status)?;
        Ok(Response::new(pb::VerifyPairHashResponse {}))
    }

    async fn accept_zero_conf(
        &self,
        request: Request<pb::AcceptZeroConfRequest>,
    ) -> Result<Response<pb::AcceptZeroConfResponse>, Status> {
        let req = request.into_inner();
        Ok(Response::new(pb::AcceptZeroConfResponse {
            accepted: self.rates.accept_zero_conf(&req.currency, req.amount),
        }))
    }

    async fn get_swap_status(
        &self,
        request: Request<pb::GetSwapStatusRequest>,
    ) -> Result<Response<pb::SwapStatusUpdate>, Status> {
        let req = request.into_inner();
        let swap_id = Self::parse_swap_id(&req.swap_id)?;

        let update = self
            .statuses
            .get_status(swap_id)
            .ok_or_else(|| Status::not_found(format!("swap not found: {swap_id}")))?;
        Ok(Response::new(update_to_proto(swap_id, &update)))
    }

    async fn stream_swap_status(
        &self,
        request: Request<pb::StreamSwapStatusRequest>,
    ) -> Result<Response<Self::StreamSwapStatusStream>, Status> {
        let req = request.into_inner();
        let swap_id = Self::parse_swap_id(&req.swap_id)?;

        let subscription = self
            .statuses
            .subscribe(swap_id)
            .map_err(status_error_to_status)?;
        let (handle, current, receiver) = subscription.into_parts();

        Ok(Response::new(SwapStatusStream {
            swap_id: swap_id.to_string(),
            handle,
            first: Some(current),
            updates: ReceiverStream::new(receiver),
            statuses: self.statuses.clone(),
        }))
    }
}
