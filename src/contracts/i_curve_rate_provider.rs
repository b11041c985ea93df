use ethers::prelude::*;

abigen!(
    ICurveRateProvider,
    r#"[
        {
            "name": "get_quotes",
            "inputs": [
                { "type": "address", "name": "source_token" },
                { "type": "address", "name": "destination_token" },
                { "type": "uint256", "name": "amount_in" }
            ],
            "outputs": [
                {
                    "type": "tuple[]",
                    "name": "",
                    "components": [
                        { "type": "uint256", "name": "source_token_index" },
                        { "type": "uint256", "name": "dest_token_index" },
                        { "type": "bool", "name": "is_underlying" },
                        { "type": "uint256", "name": "amount_out" },
                        { "type": "address", "name": "pool" },
                        { "type": "uint256", "name": "source_token_pool_balance" },
                        { "type": "uint256", "name": "dest_token_pool_balance" },
                        { "type": "uint256", "name": "pool_type" }
                    ]
                }
            ],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#
);
