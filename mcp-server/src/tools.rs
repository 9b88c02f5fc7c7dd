// Tool schema definitions

use crate::protocol::Tool;
use serde_json::json;

pub fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "debug.attach".to_string(),
            description: "Connect to a JVM via JDWP protocol".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "host": {
                        "type": "string",
                        "description": "JVM host (e.g., 'localhost')",
                        "default": "localhost"
                    },
                    "port": {
                        "type": "integer",
                        "description": "JDWP port (e.g., 5005)",
                        "default": 5005
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Handshake timeout in milliseconds",
                        "default": 5000
                    }
                },
                "required": ["host", "port"]
            }),
        },
        Tool {
            name: "debug.list_threads".to_string(),
            description: "List threads with their names and suspended frame counts".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: "debug.evaluate".to_string(),
            description: "Run a compiled instruction sequence in a suspended frame".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thread_id": {
                        "type": ["string", "integer"],
                        "description": "Thread ID from list_threads, '0x1a' style hex or a number"
                    },
                    "frame": {
                        "type": "integer",
                        "description": "Frame depth, 0 is the top frame",
                        "default": 0
                    },
                    "instructions": {
                        "type": "array",
                        "description": concat!(
                            "Instruction sequence, e.g. ",
                            "[{\"push_local\": \"values\"}, {\"field_get\": \"length\"}]"
                        ),
                        "items": {}
                    }
                },
                "required": ["thread_id", "instructions"]
            }),
        },
        Tool {
            name: "debug.disconnect".to_string(),
            description: "End the debug session".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}
