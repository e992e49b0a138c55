//! Alpaca broker adapter implementing BrokerPort.

use async_trait::async_trait;

use crate::application::ports::{
    BrokerError, BrokerPort, CancelAck, OrderAck, OrderQueryStatus, SubmitOrderRequest,
};
use crate::domain::risk_management::{Account, Position};
use crate::domain::shared::{BrokerOrderId, Symbol};

use super::api_types::{
    AlpacaAccountResponse, AlpacaOrderRequest, AlpacaOrderResponse, AlpacaPositionResponse,
    AlpacaReplaceRequest,
};
use super::config::{AlpacaConfig, AlpacaEnvironment};
use super::error::AlpacaError;
use super::http_client::AlpacaHttpClient;

/// Page size for order listings; Alpaca caps it at 500.
const ORDER_LIST_LIMIT: u32 = 500;

/// Alpaca Markets broker adapter.
#[derive(Debug, Clone)]
pub struct AlpacaBrokerAdapter {
    client: AlpacaHttpClient,
    environment: AlpacaEnvironment,
}

impl AlpacaBrokerAdapter {
    /// Create a new Alpaca broker adapter.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        let client = AlpacaHttpClient::new(config)?;
        tracing::info!(
            environment = %config.environment,
            trading_url = %config.trading_url,
            "Alpaca broker adapter initialized"
        );
        Ok(Self {
            client,
            environment: config.environment,
        })
    }

    /// Check if we're in live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.environment.is_live()
    }

    /// Underlying client, shared with the market data adapter.
    #[must_use]
    pub const fn http_client(&self) -> &AlpacaHttpClient {
        &self.client
    }
}

#[async_trait]
impl BrokerPort for AlpacaBrokerAdapter {
    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderAck, BrokerError> {
        if self.is_live() {
            tracing::warn!(
                client_order_id = %request.client_order_id,
                symbol = %request.symbol,
                "Submitting LIVE order - this will execute real trades"
            );
        }

        let body = AlpacaOrderRequest::from(&request);
        tracing::info!(
            client_order_id = %body.client_order_id,
            symbol = %body.symbol,
            side = body.side,
            order_type = body.order_type,
            qty = %body.qty,
            limit_price = ?body.limit_price,
            stop_price = ?body.stop_price,
            "Submitting order to Alpaca"
        );

        let response: AlpacaOrderResponse = self.client.post("/v2/orders", &body).await?;

        tracing::info!(
            client_order_id = %body.client_order_id,
            broker_order_id = %response.id,
            status = %response.status,
            "Order submitted"
        );
        Ok(response.to_order_ack())
    }

    async fn cancel_order(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<CancelAck, BrokerError> {
        let path = format!("/v2/orders/{}", broker_order_id.as_str());
        tracing::info!(broker_order_id = %broker_order_id, "Cancelling order");
        self.client.delete(&path).await?;

        // DELETE answers 204; read back the status it left the order in.
        let status = match self.client.get::<AlpacaOrderResponse>(&path).await {
            Ok(order) => order.status,
            Err(e) => {
                tracing::debug!(broker_order_id = %broker_order_id, error = %e, "Cancel read-back failed");
                "pending_cancel".to_string()
            }
        };
        Ok(CancelAck {
            broker_order_id: broker_order_id.clone(),
            status,
            message: None,
        })
    }

    async fn replace_order(
        &self,
        broker_order_id: &BrokerOrderId,
        replacement: SubmitOrderRequest,
    ) -> Result<OrderAck, BrokerError> {
        let body = AlpacaReplaceRequest::from(&replacement);
        tracing::info!(
            broker_order_id = %broker_order_id,
            client_order_id = %body.client_order_id,
            qty = %body.qty,
            limit_price = ?body.limit_price,
            stop_price = ?body.stop_price,
            "Replacing order"
        );
        let response: AlpacaOrderResponse = self
            .client
            .patch(&format!("/v2/orders/{}", broker_order_id.as_str()), &body)
            .await?;
        Ok(response.to_order_ack())
    }

    async fn get_order(&self, broker_order_id: &BrokerOrderId) -> Result<OrderAck, BrokerError> {
        let response: AlpacaOrderResponse = self
            .client
            .get(&format!("/v2/orders/{}", broker_order_id.as_str()))
            .await?;
        Ok(response.to_order_ack())
    }

    async fn get_orders(&self, status: OrderQueryStatus) -> Result<Vec<OrderAck>, BrokerError> {
        let responses: Vec<AlpacaOrderResponse> = self
            .client
            .get(&format!(
                "/v2/orders?status={}&limit={ORDER_LIST_LIMIT}",
                status.as_str()
            ))
            .await?;
        Ok(responses
            .iter()
            .map(AlpacaOrderResponse::to_order_ack)
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let positions: Vec<AlpacaPositionResponse> = self.client.get("/v2/positions").await?;
        Ok(positions.into_iter().map(Position::from).collect())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>, BrokerError> {
        let result: Result<AlpacaPositionResponse, AlpacaError> = self
            .client
            .get(&format!("/v2/positions/{}", symbol.as_str()))
            .await;
        match result {
            Ok(position) => Ok(Some(position.into())),
            Err(AlpacaError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self) -> Result<Account, BrokerError> {
        let account: AlpacaAccountResponse = self.client.get("/v2/account").await?;
        Ok(account.into())
    }
}
