use crate::server::HeyJackServer;
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, InitializeRequestParam,
        InitializeResult, JsonObject, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo, Tool, ToolsCapability,
    },
    service::RequestContext,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Router(pub HeyJackServer);

fn schema(value: serde_json::Value) -> Arc<JsonObject> {
    Arc::new(value.as_object().cloned().unwrap_or_default())
}

fn tool(name: &'static str, title: &'static str, description: &'static str, input: Arc<JsonObject>) -> Tool {
    Tool {
        name: name.into(),
        title: Some(title.into()),
        description: Some(description.into()),
        input_schema: input,
        icons: None,
        annotations: None,
        output_schema: None,
        meta: None,
    }
}

fn internal(e: anyhow::Error) -> McpError {
    McpError {
        code: rmcp::model::ErrorCode::INTERNAL_ERROR,
        message: e.to_string().into(),
        data: None,
    }
}

impl ServerHandler for Router {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "hey-jack".to_string(),
                title: Some("Hey Jack".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        _context: RequestContext<rmcp::service::RoleServer>,
    ) -> std::result::Result<InitializeResult, McpError> {
        let mut info = self.get_info();
        info.protocol_version = request.protocol_version.clone();
        Ok(info)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<rmcp::service::RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        let empty = schema(serde_json::json!({ "type": "object" }));
        let community = schema(serde_json::json!({
            "type": "object",
            "properties": { "community_id": { "type": "string" } },
            "required": ["community_id"],
        }));
        let upcoming = schema(serde_json::json!({
            "type": "object",
            "properties": {
                "community_id": { "type": "string" },
                "days": { "type": "integer", "minimum": 0 },
            },
        }));

        let tools = vec![
            tool("health", "Health", "Check store connectivity and config surface", empty.clone()),
            tool("status", "Status", "Row counts for every table", empty.clone()),
            tool(
                "dashboard",
                "Dashboard",
                "Members, upcoming birthdays and collection progress of one community",
                community,
            ),
            tool(
                "upcoming",
                "Upcoming birthdays",
                "Birthdays inside the window, per active community",
                upcoming,
            ),
            tool(
                "diagnose",
                "Diagnose",
                "Report contributor rows out of line with the member table",
                empty,
            ),
        ];

        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<rmcp::service::RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match request.name.as_ref() {
            "health" => self.0.handle_health(request).await.map_err(internal),
            "status" => self.0.handle_status(request).await.map_err(internal),
            "dashboard" => self.0.handle_dashboard(request).await.map_err(internal),
            "upcoming" => self.0.handle_upcoming(request).await.map_err(internal),
            "diagnose" => self.0.handle_diagnose(request).await.map_err(internal),
            _ => Err(McpError {
                code: rmcp::model::ErrorCode::METHOD_NOT_FOUND,
                message: format!("Unknown tool: {}", request.name).into(),
                data: None,
            }),
        }
    }
}
