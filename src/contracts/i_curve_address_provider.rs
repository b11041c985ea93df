use ethers::prelude::*;

abigen!(
    ICurveAddressProvider,
    r#"[
        function get_address(uint256 id) external view returns (address)
    ]"#
);
